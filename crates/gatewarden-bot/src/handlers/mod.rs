//! Update routing: one endpoint per update kind, fanned out to the group,
//! private, callback, and admin flows. Group handlers only ever see the
//! configured group; everything else is ignored.

pub mod admin;
pub mod callbacks;
pub mod dm;
pub mod group;
pub mod start;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::User;
use tracing::warn;

use crate::app::App;

/// Message endpoint for the dispatcher.
pub async fn on_message(bot: Bot, msg: Message, app: Arc<App>) -> ResponseResult<()> {
    if msg.chat.id == app.group_id() {
        group::on_group_message(&bot, &app, &msg).await;
    } else if msg.chat.is_private() {
        on_private_message(&bot, &app, &msg).await;
    }
    Ok(())
}

async fn on_private_message(bot: &Bot, app: &App, msg: &Message) {
    let text = msg.text().unwrap_or_default().trim();

    if text == "/start" || text.starts_with("/start ") {
        start::on_start(bot, app, msg).await;
        return;
    }
    if text == "/admin" {
        admin::on_admin_command(bot, app, msg).await;
        return;
    }
    // An open admin prompt captures the next message (including /cancel).
    if app.has_prompt(msg.chat.id.0) {
        admin::on_prompt_input(bot, app, msg).await;
        return;
    }
    dm::on_private_message(bot, app, msg).await;
}

/// Callback-query endpoint for the dispatcher.
pub async fn on_callback(bot: Bot, query: CallbackQuery, app: Arc<App>) -> ResponseResult<()> {
    let data = query.data.as_deref().unwrap_or_default();
    if data.starts_with("agree:") {
        callbacks::on_agree_callback(&bot, &app, &query).await;
    } else if data.starts_with("admin:") {
        admin::on_admin_callback(&bot, &app, &query).await;
    }
    Ok(())
}

/// Refresh the stored profile from a platform user object.
pub fn upsert_profile_from(app: &App, user: &User, phone_number: Option<&str>) {
    if let Err(e) = app.store.upsert_profile(
        user.id.0 as i64,
        &user.first_name,
        user.last_name.as_deref(),
        user.username.as_deref(),
        phone_number,
        chrono::Utc::now(),
    ) {
        warn!(user_id = user.id.0, error = %e, "profile upsert failed");
    }
}
