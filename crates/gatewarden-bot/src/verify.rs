//! Verification service: session setup, permission masks, and the agree
//! keyboard shared by the welcome message and reminders.

use chrono::{Duration, Utc};
use gatewarden_core::signing;
use gatewarden_core::words::MAGIC_WORDS;
use gatewarden_store::{Result as StoreResult, VerificationSession};
use rand::seq::SliceRandom;
use teloxide::prelude::*;
use teloxide::types::{ChatPermissions, InlineKeyboardButton, InlineKeyboardMarkup, UserId};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::App;

/// Inline keyboard with the signed agree button for `session`.
pub fn agree_keyboard(secret: &str, session: &VerificationSession) -> InlineKeyboardMarkup {
    let data = signing::agree_callback_data(
        secret,
        session.group_id,
        session.user_id,
        session.id,
    );
    InlineKeyboardMarkup::new([[InlineKeyboardButton::callback("Tap here", data)]])
}

/// Deep link that triggers `/start agree_{payload}` in the user's DM.
pub fn agree_deep_link(app: &App, session_id: Uuid, user_id: i64) -> String {
    let payload = signing::start_payload(
        app.secret(),
        app.config().group_id,
        user_id,
        session_id,
    );
    format!("https://t.me/{}?start=agree_{payload}", app.bot_username)
}

/// Create or reset the verification session for a joining user: fresh random
/// magic word, reminder and expiry timers from the effective settings.
pub fn new_session(app: &App, user_id: i64) -> StoreResult<VerificationSession> {
    let magic_word = MAGIC_WORDS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("apricot");
    let now = Utc::now();
    let expires_at = now + Duration::minutes(app.settings.expire_after_min());
    // remind_at never passes expires_at, whatever the configured cadence.
    let remind_at = (now + Duration::minutes(app.settings.remind_after_min())).min(expires_at);
    app.store.upsert_session(
        app.config().group_id,
        user_id,
        magic_word,
        remind_at,
        expires_at,
        now,
    )
}

/// Take away all posting permissions. Best-effort: a missing bot privilege is
/// logged and the verification flow continues.
pub async fn restrict_user(bot: &Bot, group_id: ChatId, user_id: i64) {
    match bot
        .restrict_chat_member(group_id, UserId(user_id as u64), ChatPermissions::empty())
        .await
    {
        Ok(_) => info!(user_id, "restricted user"),
        Err(e) => warn!(user_id, error = %e, "failed to restrict user"),
    }
}

/// Restore the default member permissions after a successful verification.
pub async fn unrestrict_user(bot: &Bot, group_id: ChatId, user_id: i64) {
    let permissions = ChatPermissions::SEND_MESSAGES
        | ChatPermissions::SEND_MEDIA_MESSAGES
        | ChatPermissions::SEND_POLLS
        | ChatPermissions::SEND_OTHER_MESSAGES
        | ChatPermissions::ADD_WEB_PAGE_PREVIEWS
        | ChatPermissions::INVITE_USERS;
    match bot
        .restrict_chat_member(group_id, UserId(user_id as u64), permissions)
        .await
    {
        Ok(_) => info!(user_id, "unrestricted user"),
        Err(e) => warn!(user_id, error = %e, "failed to unrestrict user"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatewarden_core::signing::{SIG_LEN, TOKEN_LEN};
    use gatewarden_store::SessionState;

    fn session() -> VerificationSession {
        let now = Utc::now();
        VerificationSession {
            id: Uuid::new_v4(),
            group_id: -1001,
            user_id: 100,
            state: SessionState::JoinedLocked,
            magic_word: "apricot".into(),
            welcome_message_id: None,
            reminder_count: 0,
            remind_at: now,
            expires_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn keyboard_carries_signed_agree_payload() {
        let session = session();
        let kb = agree_keyboard("secret", &session);
        let button = &kb.inline_keyboard[0][0];
        match &button.kind {
            teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => {
                assert!(data.starts_with("agree:100:"));
                let parts: Vec<&str> = data.splitn(4, ':').collect();
                assert_eq!(parts[2].len(), TOKEN_LEN);
                assert_eq!(parts[3].len(), SIG_LEN);
            }
            other => panic!("expected callback button, got {other:?}"),
        }
    }
}
