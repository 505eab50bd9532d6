//! `/start` in a private chat.
//!
//! With an `agree_` deep-link payload it advances the verification session
//! to the DM-confirmation state and sends the rules containing the magic
//! word. Without a payload it sends a short greeting. Anything malformed is
//! dropped silently.

use chrono::Utc;
use gatewarden_core::signing;
use gatewarden_core::texts::{render_rules, START_NO_SESSION_TEXT};
use gatewarden_store::SessionState;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, info, warn};

use crate::app::App;

pub async fn on_start(bot: &Bot, app: &App, msg: &Message) {
    let Some(from) = msg.from.as_ref() else {
        return;
    };
    let payload = extract_start_arg(msg.text().unwrap_or_default());

    if payload.is_empty() {
        if let Err(e) = bot.send_message(msg.chat.id, START_NO_SESSION_TEXT).await {
            warn!(error = %e, "failed to send start greeting");
        }
        return;
    }

    let Some(payload) = payload.strip_prefix("agree_") else {
        debug!("start payload missing agree_ prefix");
        return;
    };
    let Some(session_id) = signing::parse_start_payload(payload) else {
        debug!("start payload parse failed");
        return;
    };

    let session = match app.store.session_by_id(session_id) {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(%session_id, "start ignored: session not found");
            return;
        }
        Err(e) => {
            warn!(error = %e, "session lookup failed on /start");
            return;
        }
    };

    let user_id = from.id.0 as i64;
    if session.group_id != app.config().group_id {
        debug!(%session_id, "start ignored: group mismatch");
        return;
    }
    if session.user_id != user_id {
        debug!(%session_id, user_id, "start ignored: user mismatch");
        return;
    }
    if !signing::verify_start_payload(
        app.secret(),
        session.group_id,
        session.user_id,
        session.id,
        payload,
    ) {
        debug!(%session_id, "start ignored: payload signature invalid");
        return;
    }
    if session.state == SessionState::ConfirmedUnlocked {
        debug!(%session_id, "start ignored: already confirmed");
        return;
    }
    if session.is_expired(Utc::now()) {
        debug!(%session_id, "start ignored: session expired");
        return;
    }

    if let Err(e) = app
        .store
        .set_session_state(session.id, SessionState::WaitingDmConfirm, Utc::now())
    {
        warn!(error = %e, "failed to advance session state");
        return;
    }

    if let Err(e) = bot
        .send_message(msg.chat.id, render_rules(&session.magic_word))
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!(user_id, error = %e, "failed to send rules DM");
        return;
    }
    info!(user_id, "sent rules to user");
}

/// The argument after `/start`, if any.
fn extract_start_arg(text: &str) -> &str {
    text.strip_prefix("/start")
        .map(str::trim)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_arg_extraction() {
        assert_eq!(extract_start_arg("/start"), "");
        assert_eq!(extract_start_arg("/start agree_abc"), "agree_abc");
        assert_eq!(extract_start_arg("/start   agree_abc  "), "agree_abc");
        assert_eq!(extract_start_arg("hello"), "");
    }
}
