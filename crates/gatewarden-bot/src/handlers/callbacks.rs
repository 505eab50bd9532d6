//! The agree-button callback: verify the signed payload, then answer with a
//! deep link into the user's private chat. Every failure answers the
//! callback empty — the spinner stops and nothing is revealed.

use gatewarden_core::signing;
use gatewarden_core::texts::ALERT_TEXT;
use teloxide::prelude::*;
use teloxide::types::MaybeInaccessibleMessage;
use url::Url;
use tracing::{debug, info};

use crate::app::App;
use crate::verify::agree_deep_link;

pub async fn on_agree_callback(bot: &Bot, app: &App, query: &CallbackQuery) {
    if let Some(chat_id) = query.message.as_ref().map(message_chat_id) {
        if chat_id != app.group_id() {
            debug!("agree callback from wrong chat");
            return;
        }
    }

    let data = query.data.as_deref().unwrap_or_default();
    let parts: Vec<&str> = data.splitn(4, ':').collect();
    let [_, user_id_str, token, signature] = parts.as_slice() else {
        debug!("agree callback with malformed data");
        return;
    };

    let (Ok(intended_user_id), Some(session_id)) = (
        user_id_str.parse::<i64>(),
        signing::decode_session_id(token),
    ) else {
        debug!("agree callback decode failed");
        return;
    };

    let presser_id = query.from.id.0 as i64;
    if presser_id != intended_user_id {
        // Someone pressed a button that is not theirs.
        let _ = bot
            .answer_callback_query(query.id.clone())
            .text(ALERT_TEXT)
            .show_alert(true)
            .await;
        debug!(presser_id, intended_user_id, "agree callback from wrong user");
        return;
    }

    let group_id = app.config().group_id;
    if !signing::verify_callback_signature(
        app.secret(),
        group_id,
        intended_user_id,
        session_id,
        signature,
    ) {
        let _ = bot.answer_callback_query(query.id.clone()).await;
        debug!(intended_user_id, "agree callback signature invalid");
        return;
    }

    // The store lookup happens only after the signature passed.
    let session = match app.store.session_by_id(session_id) {
        Ok(Some(session)) => session,
        _ => {
            let _ = bot.answer_callback_query(query.id.clone()).await;
            debug!(intended_user_id, "agree callback session not found");
            return;
        }
    };
    if session.user_id != intended_user_id || session.group_id != group_id {
        let _ = bot.answer_callback_query(query.id.clone()).await;
        debug!(intended_user_id, "agree callback session mismatch");
        return;
    }

    let deep_link = agree_deep_link(app, session.id, intended_user_id);
    match deep_link.parse::<Url>() {
        Ok(url) => {
            let _ = bot.answer_callback_query(query.id.clone()).url(url).await;
            info!(user_id = intended_user_id, "redirected user to DM");
        }
        Err(e) => {
            let _ = bot.answer_callback_query(query.id.clone()).await;
            debug!(error = %e, "deep link failed to parse");
        }
    }
}

fn message_chat_id(message: &MaybeInaccessibleMessage) -> ChatId {
    match message {
        MaybeInaccessibleMessage::Regular(msg) => msg.chat.id,
        MaybeInaccessibleMessage::Inaccessible(msg) => msg.chat.id,
    }
}
