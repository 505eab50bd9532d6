//! Private-chat verification: the magic-word confirmation and contact
//! (phone) capture.

use chrono::Utc;
use gatewarden_core::texts::{render_success, DM_SUCCESS_TEXT};
use gatewarden_lexicon::normalize_text;
use gatewarden_store::SessionState;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use tracing::{debug, info, warn};

use crate::app::App;
use crate::handlers::upsert_profile_from;
use crate::verify;

pub async fn on_private_message(bot: &Bot, app: &App, msg: &Message) {
    let Some(from) = msg.from.as_ref() else {
        return;
    };
    let user_id = from.id.0 as i64;

    // A shared contact persists the phone number regardless of the
    // verification outcome, but only when the contact is the sender's own.
    let phone_number = msg
        .contact()
        .filter(|contact| contact.user_id == Some(from.id))
        .map(|contact| contact.phone_number.as_str());
    upsert_profile_from(app, from, phone_number);

    let group_id = app.config().group_id;
    let session = match app.store.session_for_user(group_id, user_id) {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(user_id, "dm ignored: no session");
            return;
        }
        Err(e) => {
            warn!(user_id, error = %e, "session lookup failed in DM");
            return;
        }
    };

    if !matches!(
        session.state,
        SessionState::JoinedLocked | SessionState::WaitingDmConfirm
    ) {
        debug!(user_id, "dm ignored: wrong state");
        return;
    }
    if session.is_expired(Utc::now()) {
        debug!(user_id, "dm ignored: session expired");
        return;
    }

    let fold = app.config().case_insensitive;
    let given = normalize_text(msg.text().unwrap_or_default(), fold);
    if given.is_empty() || given != normalize_text(&session.magic_word, fold) {
        debug!(user_id, "dm ignored: word mismatch");
        return;
    }

    verify::unrestrict_user(bot, app.group_id(), user_id).await;
    let now = Utc::now();
    if let Err(e) = app.store.mark_approved(group_id, user_id, now) {
        warn!(user_id, error = %e, "failed to mark user approved");
        return;
    }
    if let Err(e) = app
        .store
        .confirm_session(session.id, app.settings.max_reminders(), now)
    {
        warn!(user_id, error = %e, "failed to confirm session");
    }

    // Turn the welcome message into the success notice; fall back to a fresh
    // message when editing fails or no welcome id was recorded.
    let success = render_success(user_id, &from.full_name());
    let edited = match session.welcome_message_id {
        Some(message_id) => bot
            .edit_message_text(app.group_id(), MessageId(message_id), &success)
            .parse_mode(ParseMode::Html)
            .await
            .is_ok(),
        None => false,
    };
    if !edited {
        if let Err(e) = bot
            .send_message(app.group_id(), &success)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!(user_id, error = %e, "failed to announce success in group");
        }
    }

    if let Err(e) = bot.send_message(msg.chat.id, DM_SUCCESS_TEXT).await {
        debug!(user_id, error = %e, "failed to send DM confirmation");
    }
    info!(user_id, "user approved");
}
