//! Private-chat admin panel: lexicon management (list, detail, toggle,
//! remove, add, search, bulk import, export) and runtime-setting edits.
//!
//! Multi-step flows park a prompt in `App::admin_chats`; the next private
//! message from that chat is consumed by [`on_prompt_input`]. `/cancel`
//! aborts any prompt. Every lexicon mutation refreshes the cache.

use chrono::Utc;
use gatewarden_core::settings::SUPPORTED_KEYS;
use gatewarden_core::texts::escape;
use gatewarden_lexicon::normalize_word;
use gatewarden_lexicon::seed::classify;
use gatewarden_store::ProhibitedWord;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage, MessageId,
};
use tracing::{info, warn};

use crate::app::{AdminPrompt, App};

const PER_PAGE: i64 = 10;
/// Keep exported chunks safely under Telegram's 4096-char message limit.
const EXPORT_CHUNK_MAX: usize = 3500;
/// Admin-entered words may be shorter than file-seeded ones.
const MIN_ADMIN_WORD_LEN: usize = 2;

pub async fn on_admin_command(bot: &Bot, app: &App, msg: &Message) {
    let Some(from) = msg.from.as_ref() else {
        return;
    };
    if !app.config().admin_panel_enabled || !app.settings.is_admin(from.id.0 as i64) {
        return;
    }
    if let Err(e) = bot
        .send_message(msg.chat.id, "Admin panel:")
        .reply_markup(menu_kb())
        .await
    {
        warn!(error = %e, "failed to open admin panel");
    }
}

pub async fn on_admin_callback(bot: &Bot, app: &App, query: &CallbackQuery) {
    if !app.config().admin_panel_enabled || !app.settings.is_admin(query.from.id.0 as i64) {
        let _ = bot
            .answer_callback_query(query.id.clone())
            .text("Access denied")
            .show_alert(true)
            .await;
        return;
    }
    let Some((chat_id, message_id)) = query.message.as_ref().map(message_ref) else {
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    };
    let data = query.data.as_deref().unwrap_or_default();

    if data.starts_with("admin:menu") {
        edit(bot, chat_id, message_id, "Admin panel:", Some(menu_kb())).await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:close") {
        let _ = bot.delete_message(chat_id, message_id).await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:list") {
        let page = parse_param(data, "p")
            .and_then(|p| p.parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);
        show_list(bot, app, chat_id, message_id, page).await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:backlist") {
        let page = app.last_list_page(chat_id.0);
        show_list(bot, app, chat_id, message_id, page).await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:detail") {
        let Some(row) = word_from_param(app, data) else {
            let _ = bot
                .answer_callback_query(query.id.clone())
                .text("Not found")
                .show_alert(true)
                .await;
            return;
        };
        edit(
            bot,
            chat_id,
            message_id,
            &word_detail_text(&row),
            Some(detail_kb(row.id, row.enabled)),
        )
        .await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:toggle") {
        let Some(row) = word_from_param(app, data) else {
            let _ = bot
                .answer_callback_query(query.id.clone())
                .text("Not found")
                .show_alert(true)
                .await;
            return;
        };
        let enabled = !row.enabled;
        if let Err(e) = app.store.set_word_enabled(row.id, enabled) {
            warn!(error = %e, "toggle failed");
        }
        refresh_lexicon(app);
        if let Some(row) = app.store.word_by_id(row.id).ok().flatten() {
            edit(
                bot,
                chat_id,
                message_id,
                &word_detail_text(&row),
                Some(detail_kb(row.id, row.enabled)),
            )
            .await;
        }
        let _ = bot
            .answer_callback_query(query.id.clone())
            .text("Updated")
            .await;
        return;
    }

    if data.starts_with("admin:remove:confirm") {
        if let Some(row) = word_from_param(app, data) {
            if let Err(e) = app.store.delete_word(row.id) {
                warn!(error = %e, "delete failed");
            }
            refresh_lexicon(app);
            info!(word = %row.word, "lexicon entry deleted");
        }
        let _ = bot
            .answer_callback_query(query.id.clone())
            .text("Deleted")
            .await;
        let page = app.last_list_page(chat_id.0);
        show_list(bot, app, chat_id, message_id, page).await;
        return;
    }

    if data.starts_with("admin:remove:id=") {
        let Some(row) = word_from_param(app, data) else {
            let _ = bot
                .answer_callback_query(query.id.clone())
                .text("Not found")
                .show_alert(true)
                .await;
            return;
        };
        let text = format!(
            "Confirm removal of this entry:\n\nWord: {}\nNormalized: {}",
            escape(row.display()),
            escape(&row.word)
        );
        edit(bot, chat_id, message_id, &text, Some(confirm_remove_kb(row.id))).await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:add") {
        app.set_prompt(chat_id.0, AdminPrompt::AddWord);
        edit(
            bot,
            chat_id,
            message_id,
            "Send the new word or phrase (one entry). Cancel: /cancel",
            None,
        )
        .await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:remove") {
        app.set_prompt(chat_id.0, AdminPrompt::RemoveWord);
        edit(
            bot,
            chat_id,
            message_id,
            "Send the word to disable (exact match). Cancel: /cancel",
            None,
        )
        .await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:search") {
        app.set_prompt(chat_id.0, AdminPrompt::Search);
        edit(bot, chat_id, message_id, "Send the search query. Cancel: /cancel", None).await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:bulk") {
        app.set_prompt(chat_id.0, AdminPrompt::BulkImport);
        edit(
            bot,
            chat_id,
            message_id,
            "Send several words/phrases, one per line. Lines starting with # are ignored. Cancel: /cancel",
            None,
        )
        .await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:export") {
        match app.store.export_enabled() {
            Ok(lines) => {
                for chunk in chunk_lines(&lines, EXPORT_CHUNK_MAX) {
                    if let Err(e) = bot.send_message(chat_id, chunk).await {
                        warn!(error = %e, "export chunk send failed");
                        break;
                    }
                }
            }
            Err(e) => warn!(error = %e, "export query failed"),
        }
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:settings:edit") {
        let Some(key) = parse_param(data, "key").filter(|k| SUPPORTED_KEYS.contains(k)) else {
            let _ = bot.answer_callback_query(query.id.clone()).await;
            return;
        };
        app.set_prompt(chat_id.0, AdminPrompt::EditSetting(key.to_string()));
        edit(
            bot,
            chat_id,
            message_id,
            &format!("Enter the new value for {key}.\nCancel: /cancel"),
            None,
        )
        .await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    if data.starts_with("admin:settings") {
        let current = app.settings.current();
        let mut lines = vec!["Settings:".to_string()];
        for (key, value) in &current {
            lines.push(format!("- {key} = {value}"));
        }
        let mut buttons: Vec<Vec<InlineKeyboardButton>> = current
            .keys()
            .map(|key| {
                vec![InlineKeyboardButton::callback(
                    key.clone(),
                    format!("admin:settings:edit:key={key}"),
                )]
            })
            .collect();
        buttons.push(vec![InlineKeyboardButton::callback("⬅ Back", "admin:menu")]);
        edit(
            bot,
            chat_id,
            message_id,
            &lines.join("\n"),
            Some(InlineKeyboardMarkup::new(buttons)),
        )
        .await;
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return;
    }

    let _ = bot.answer_callback_query(query.id.clone()).await;
}

/// Consume one private message while a prompt is open for the chat.
pub async fn on_prompt_input(bot: &Bot, app: &App, msg: &Message) {
    let Some(from) = msg.from.as_ref() else {
        return;
    };
    let admin_id = from.id.0 as i64;
    if !app.config().admin_panel_enabled || !app.settings.is_admin(admin_id) {
        app.take_prompt(msg.chat.id.0);
        return;
    }
    let raw = msg.text().unwrap_or_default().trim().to_string();

    if raw == "/cancel" {
        app.take_prompt(msg.chat.id.0);
        send_menu(bot, msg.chat.id).await;
        return;
    }

    let Some(prompt) = app.take_prompt(msg.chat.id.0) else {
        return;
    };
    let fold = app.config().case_insensitive;

    match prompt {
        AdminPrompt::AddWord => {
            let (stored, kind) = classify(&raw, fold);
            if normalize_word(&raw, fold).len() < MIN_ADMIN_WORD_LEN {
                app.set_prompt(msg.chat.id.0, AdminPrompt::AddWord);
                reply(bot, msg.chat.id, "That is not a usable word. /cancel").await;
                return;
            }
            if let Err(e) = app
                .store
                .upsert_word(&stored, &raw, kind, admin_id, Utc::now())
            {
                warn!(error = %e, "add word failed");
                reply(bot, msg.chat.id, "Something went wrong. /cancel").await;
                return;
            }
            refresh_lexicon(app);
            info!(word = %stored, "lexicon entry added");
            reply_with_menu(bot, msg.chat.id, "Saved ✅").await;
        }
        AdminPrompt::RemoveWord => {
            let (stored, _) = classify(&raw, fold);
            if stored.is_empty() {
                app.set_prompt(msg.chat.id.0, AdminPrompt::RemoveWord);
                reply(bot, msg.chat.id, "That is not a usable word. /cancel").await;
                return;
            }
            match app.store.word_by_norm(&stored) {
                Ok(Some(row)) => {
                    if let Err(e) = app.store.set_word_enabled(row.id, false) {
                        warn!(error = %e, "disable failed");
                    }
                    refresh_lexicon(app);
                    reply(bot, msg.chat.id, "Disabled ✅").await;
                }
                Ok(None) => reply(bot, msg.chat.id, "Not found").await,
                Err(e) => warn!(error = %e, "remove lookup failed"),
            }
            send_menu(bot, msg.chat.id).await;
        }
        AdminPrompt::Search => {
            let (fragment, _) = classify(&raw, fold);
            if fragment.is_empty() {
                app.set_prompt(msg.chat.id.0, AdminPrompt::Search);
                reply(bot, msg.chat.id, "That is not a usable query. /cancel").await;
                return;
            }
            match app.store.search_words(&fragment, 50) {
                Ok(rows) if rows.is_empty() => reply(bot, msg.chat.id, "Not found").await,
                Ok(rows) => {
                    let mut lines = vec!["Search results:".to_string()];
                    for row in rows {
                        let status = if row.enabled { "✅" } else { "🚫" };
                        lines.push(format!(
                            "- {} {status} (id:{})",
                            escape(row.display()),
                            row.id
                        ));
                    }
                    reply(bot, msg.chat.id, &lines.join("\n")).await;
                }
                Err(e) => warn!(error = %e, "search failed"),
            }
            send_menu(bot, msg.chat.id).await;
        }
        AdminPrompt::BulkImport => {
            let (added, reenabled, skipped) = bulk_import(app, &raw, fold, admin_id);
            refresh_lexicon(app);
            reply_with_menu(
                bot,
                msg.chat.id,
                &format!("Imported: {added}, re-enabled: {reenabled}, skipped: {skipped}"),
            )
            .await;
        }
        AdminPrompt::EditSetting(key) => {
            if raw.is_empty() {
                app.set_prompt(msg.chat.id.0, AdminPrompt::EditSetting(key));
                reply(bot, msg.chat.id, "Empty value. /cancel").await;
                return;
            }
            match app.settings.apply(&key, &raw) {
                Ok(()) => {
                    if let Err(e) = app.store.upsert_setting(&key, &raw, admin_id, Utc::now()) {
                        warn!(error = %e, "setting persist failed");
                    }
                    info!(%key, value = %raw, "runtime setting updated");
                    reply_with_menu(bot, msg.chat.id, &format!("Saved: {key} = {raw}")).await;
                }
                Err(e) => {
                    // Invalid values are rejected and never persisted.
                    app.set_prompt(msg.chat.id.0, AdminPrompt::EditSetting(key));
                    reply(bot, msg.chat.id, &format!("Invalid value: {e}. /cancel")).await;
                }
            }
        }
    }
}

/// One bulk-import pass: `(added, re-enabled, skipped)`.
fn bulk_import(app: &App, raw: &str, fold: bool, admin_id: i64) -> (usize, usize, usize) {
    let now = Utc::now();
    let mut added = 0;
    let mut reenabled = 0;
    let mut skipped = 0;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if normalize_word(line, fold).len() < MIN_ADMIN_WORD_LEN {
            skipped += 1;
            continue;
        }
        let (stored, kind) = classify(line, fold);
        let existing = app.store.word_by_norm(&stored).ok().flatten();
        if let Err(e) = app.store.upsert_word(&stored, line, kind, admin_id, now) {
            warn!(error = %e, word = %stored, "bulk upsert failed");
            skipped += 1;
            continue;
        }
        match existing {
            None => added += 1,
            Some(row) if !row.enabled => reenabled += 1,
            Some(_) => {}
        }
    }
    (added, reenabled, skipped)
}

async fn show_list(bot: &Bot, app: &App, chat_id: ChatId, message_id: MessageId, page: i64) {
    let total = app.store.count_words().unwrap_or(0);
    let total_pages = ((total + PER_PAGE - 1) / PER_PAGE).max(1);
    let page = page.min(total_pages);
    let rows = app
        .store
        .list_words((page - 1) * PER_PAGE, PER_PAGE)
        .unwrap_or_default();
    app.remember_list_page(chat_id.0, page);
    let text = format!("Prohibited words (page {page}/{total_pages}):");
    edit(bot, chat_id, message_id, &text, Some(list_kb(page, total_pages, &rows))).await;
}

fn refresh_lexicon(app: &App) {
    if let Err(e) = app.lexicon.refresh(&app.store) {
        warn!(error = %e, "lexicon cache refresh failed");
    }
}

fn word_from_param(app: &App, data: &str) -> Option<ProhibitedWord> {
    let id = parse_param(data, "id")?.parse::<i64>().ok()?;
    app.store.word_by_id(id).ok().flatten()
}

fn word_detail_text(row: &ProhibitedWord) -> String {
    let status = if row.enabled { "✅ enabled" } else { "🚫 disabled" };
    format!(
        "Word: {}\nNormalized: {}\nStatus: {status}\nMatch: {}",
        escape(row.display()),
        escape(&row.word),
        row.match_kind
    )
}

/// Pull `key=value` out of a colon-separated callback payload.
fn parse_param<'a>(data: &'a str, key: &str) -> Option<&'a str> {
    data.split(':')
        .find_map(|part| part.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')))
}

/// Group display lines into messages no longer than `max` chars.
fn chunk_lines(lines: &[String], max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in lines {
        if !current.is_empty() && current.len() + line.len() + 1 > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn menu_kb() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        [InlineKeyboardButton::callback("📜 List words", "admin:list:p=1")],
        [InlineKeyboardButton::callback("➕ Add word", "admin:add")],
        [InlineKeyboardButton::callback("🗑 Remove word", "admin:remove")],
        [InlineKeyboardButton::callback("🔎 Search", "admin:search")],
        [InlineKeyboardButton::callback("📥 Bulk import", "admin:bulk")],
        [InlineKeyboardButton::callback("📤 Export", "admin:export")],
        [InlineKeyboardButton::callback("⚙️ Settings", "admin:settings")],
        [InlineKeyboardButton::callback("❌ Close", "admin:close")],
    ])
}

fn list_kb(page: i64, total_pages: i64, rows: &[ProhibitedWord]) -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| {
            let status = if row.enabled { "✅" } else { "🚫" };
            vec![InlineKeyboardButton::callback(
                format!("{status} {}", row.display()),
                format!("admin:detail:id={}", row.id),
            )]
        })
        .collect();
    let mut nav = Vec::new();
    if page > 1 {
        nav.push(InlineKeyboardButton::callback(
            "◀ Prev",
            format!("admin:list:p={}", page - 1),
        ));
    }
    if page < total_pages {
        nav.push(InlineKeyboardButton::callback(
            "Next ▶",
            format!("admin:list:p={}", page + 1),
        ));
    }
    if !nav.is_empty() {
        keyboard.push(nav);
    }
    keyboard.push(vec![InlineKeyboardButton::callback("⬅ Back", "admin:menu")]);
    InlineKeyboardMarkup::new(keyboard)
}

fn detail_kb(id: i64, enabled: bool) -> InlineKeyboardMarkup {
    let toggle = if enabled { "🚫 Disable" } else { "✅ Enable" };
    InlineKeyboardMarkup::new([
        vec![InlineKeyboardButton::callback(
            toggle,
            format!("admin:toggle:id={id}"),
        )],
        vec![InlineKeyboardButton::callback(
            "🗑 Remove",
            format!("admin:remove:id={id}"),
        )],
        vec![InlineKeyboardButton::callback("⬅ Back to list", "admin:backlist")],
    ])
}

fn confirm_remove_kb(id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([vec![
        InlineKeyboardButton::callback("✅ Yes, delete", format!("admin:remove:confirm:id={id}")),
        InlineKeyboardButton::callback("❌ Cancel", format!("admin:detail:id={id}")),
    ]])
}

fn message_ref(message: &MaybeInaccessibleMessage) -> (ChatId, MessageId) {
    match message {
        MaybeInaccessibleMessage::Regular(msg) => (msg.chat.id, msg.id),
        MaybeInaccessibleMessage::Inaccessible(msg) => (msg.chat.id, msg.message_id),
    }
}

async fn edit(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) {
    let request = bot.edit_message_text(chat_id, message_id, text);
    let result = match keyboard {
        Some(kb) => request.reply_markup(kb).await,
        None => request.await,
    };
    if let Err(e) = result {
        warn!(error = %e, "admin panel edit failed");
    }
}

async fn reply(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, text).await {
        warn!(error = %e, "admin reply failed");
    }
}

async fn send_menu(bot: &Bot, chat_id: ChatId) {
    if let Err(e) = bot
        .send_message(chat_id, "Admin panel:")
        .reply_markup(menu_kb())
        .await
    {
        warn!(error = %e, "failed to send admin menu");
    }
}

async fn reply_with_menu(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot
        .send_message(chat_id, text)
        .reply_markup(menu_kb())
        .await
    {
        warn!(error = %e, "admin reply failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_params_parse() {
        assert_eq!(parse_param("admin:list:p=3", "p"), Some("3"));
        assert_eq!(parse_param("admin:detail:id=42", "id"), Some("42"));
        assert_eq!(parse_param("admin:settings:edit:key=MUTE_MINUTES", "key"), Some("MUTE_MINUTES"));
        assert_eq!(parse_param("admin:menu", "id"), None);
    }

    #[test]
    fn chunking_respects_limit() {
        let lines: Vec<String> = (0..100).map(|i| format!("word-{i:04}")).collect();
        let chunks = chunk_lines(&lines, 100);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.lines()).collect();
        assert_eq!(rejoined.len(), 100);
    }

    #[test]
    fn chunking_keeps_single_long_line() {
        let lines = vec!["x".repeat(50)];
        let chunks = chunk_lines(&lines, 10);
        assert_eq!(chunks.len(), 1);
    }
}
