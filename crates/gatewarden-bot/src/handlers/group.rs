//! Group-side handlers: the join transition, service-message cleanup, and
//! the unapproved-sender filter in front of the moderation pipeline.

use std::sync::Arc;

use gatewarden_core::texts::render_welcome;
use gatewarden_store::SessionState;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, ChatMemberUpdated, ParseMode};
use tracing::{debug, info, warn};

use crate::app::App;
use crate::handlers::upsert_profile_from;
use crate::moderation;
use crate::verify;

fn is_present(kind: &ChatMemberKind) -> bool {
    matches!(
        kind,
        ChatMemberKind::Owner(_)
            | ChatMemberKind::Administrator(_)
            | ChatMemberKind::Member
            | ChatMemberKind::Restricted(_)
    )
}

/// Chat-member endpoint: locks newly joined users and opens their
/// verification session.
pub async fn on_chat_member(bot: Bot, update: ChatMemberUpdated, app: Arc<App>) -> ResponseResult<()> {
    if update.chat.id != app.group_id() {
        return Ok(());
    }
    let joined = !is_present(&update.old_chat_member.kind) && is_present(&update.new_chat_member.kind);
    if !joined {
        return Ok(());
    }
    let user = &update.new_chat_member.user;
    if user.is_bot {
        return Ok(());
    }
    let user_id = user.id.0 as i64;

    upsert_profile_from(&app, user, None);
    match app.store.is_approved(app.config().group_id, user_id) {
        Ok(true) => {
            debug!(user_id, "join ignored: already approved");
            return Ok(());
        }
        Ok(false) => {}
        Err(e) => {
            warn!(user_id, error = %e, "approval lookup failed on join");
            return Ok(());
        }
    }

    let session = match verify::new_session(&app, user_id) {
        Ok(session) => session,
        Err(e) => {
            warn!(user_id, error = %e, "failed to create verification session");
            return Ok(());
        }
    };

    verify::restrict_user(&bot, app.group_id(), user_id).await;

    let welcome = bot
        .send_message(app.group_id(), render_welcome(user_id, &user.full_name()))
        .parse_mode(ParseMode::Html)
        .reply_markup(verify::agree_keyboard(app.secret(), &session))
        .await;
    match welcome {
        Ok(message) => {
            if let Err(e) = app
                .store
                .attach_welcome_message(session.id, message.id.0, chrono::Utc::now())
            {
                warn!(user_id, error = %e, "failed to attach welcome message id");
            }
        }
        Err(e) => {
            warn!(user_id, error = %e, "failed to send welcome message");
            return Ok(());
        }
    }

    info!(user_id, group_id = app.config().group_id, "new user locked");
    Ok(())
}

/// Group messages: delete join/leave service messages, delete posts from
/// unapproved non-admin users, and hand the rest to the moderation pipeline.
pub async fn on_group_message(bot: &Bot, app: &App, msg: &Message) {
    // Join/leave service messages are always removed.
    if msg.new_chat_members().is_some() || msg.left_chat_member().is_some() {
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            debug!(error = %e, "failed to delete service message");
        }
        return;
    }

    let Some(from) = msg.from.as_ref() else {
        return;
    };
    if from.is_bot {
        return;
    }
    let user_id = from.id.0 as i64;
    upsert_profile_from(app, from, None);

    if !is_allowed_to_post(app, user_id) {
        if app.settings.is_admin(user_id) {
            return;
        }
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            debug!(user_id, error = %e, "failed to delete unapproved message");
        }
        return;
    }

    moderation::moderate_group_message(bot, app, msg).await;
}

/// Approved members and users whose session already confirmed may post.
fn is_allowed_to_post(app: &App, user_id: i64) -> bool {
    let group_id = app.config().group_id;
    match app.store.is_approved(group_id, user_id) {
        Ok(true) => return true,
        Ok(false) => {}
        Err(e) => {
            warn!(user_id, error = %e, "approval lookup failed, leaving message in place");
            return true;
        }
    }
    match app.store.session_for_user(group_id, user_id) {
        Ok(Some(session)) => session.state == SessionState::ConfirmedUnlocked,
        Ok(None) => false,
        Err(e) => {
            warn!(user_id, error = %e, "session lookup failed, leaving message in place");
            true
        }
    }
}
