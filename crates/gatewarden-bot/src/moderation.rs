//! Moderation pipeline for approved members' group messages.
//!
//! Filter order (each short-circuits): platform-admin bypass → approved gate
//! → lexicon match → AI gates (master switch, length, sampling, cooldown) →
//! classifier verdict. A hit runs the punishment sequence; its steps fail
//! independently and the audit record is written last so it reflects what
//! actually happened.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use gatewarden_classifier::AiDecision;
use gatewarden_core::texts::{escape, html_mention, render_mute_notice};
use gatewarden_store::{
    ModerationAction, ModerationReason, NewModerationEvent, UserProfile,
};
use rand::Rng;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMemberKind, Message, ParseMode, UserId};
use tracing::{debug, error, info, warn};

use crate::app::App;

/// Per-user sliding window suppressing duplicate group notifications.
/// In-memory only; losing it on restart merely allows one extra notice.
pub struct NotifyThrottle {
    window: Duration,
    last: Mutex<HashMap<i64, DateTime<Utc>>>,
}

impl NotifyThrottle {
    pub fn new(window_seconds: i64) -> Self {
        Self {
            window: Duration::seconds(window_seconds),
            last: Mutex::new(HashMap::new()),
        }
    }

    /// True when no notification went out for `user_id` within the window;
    /// records `now` as the new anchor in that case.
    pub fn should_notify(&self, user_id: i64, now: DateTime<Utc>) -> bool {
        let mut last = self.last.lock().unwrap();
        if let Some(prev) = last.get(&user_id) {
            if now - *prev < self.window {
                return false;
            }
        }
        last.insert(user_id, now);
        true
    }
}

/// Render a UTC instant in the configured local timezone.
pub fn format_until(until: DateTime<Utc>, tz: Tz) -> String {
    until.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

/// Run the pipeline for one group message that passed the unapproved filter.
pub async fn moderate_group_message(bot: &Bot, app: &App, msg: &Message) {
    let Some(from) = msg.from.as_ref() else {
        return;
    };
    let user_id = from.id.0 as i64;
    let Some(text) = msg.text().or(msg.caption()) else {
        return;
    };

    // 1. Platform-admin bypass.
    match bot.get_chat_member(app.group_id(), from.id).await {
        Ok(member) => {
            if matches!(
                member.kind,
                ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_)
            ) {
                return;
            }
        }
        Err(e) => warn!(user_id, error = %e, "failed to check member status for moderation"),
    }

    // 2. Only approved members reach the pipeline; unapproved messages were
    //    already deleted by the group handler.
    match app.store.is_approved(app.config().group_id, user_id) {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            error!(user_id, error = %e, "approval lookup failed");
            return;
        }
    }

    // 3. Local lexicon match.
    if let Some(entry) = app.lexicon.match_text(text) {
        info!(user_id, word = %entry.display, "lexicon match");
        punish(bot, app, msg, ModerationReason::Keyword, Some(&entry.display), None).await;
        return;
    }

    // 4. AI gates.
    if !app.settings.ai_moderation_enabled() {
        return;
    }
    let config = app.config();
    if text.chars().count() < config.ai_moderation_min_chars {
        return;
    }
    if rand::thread_rng().gen::<f64>() > config.ai_moderation_sample_rate {
        debug!(user_id, "ai moderation sample skipped");
        return;
    }

    // 5. Claim the cooldown slot before the external call so a burst of
    //    messages costs one classifier request.
    let now = Utc::now();
    match app
        .store
        .try_stamp_ai_check(user_id, now, config.ai_moderation_cooldown_sec)
    {
        Ok(true) => {}
        Ok(false) => {
            debug!(user_id, "ai moderation cooldown active");
            return;
        }
        Err(e) => {
            error!(user_id, error = %e, "cooldown stamp failed");
            return;
        }
    }

    let Some(decision) = app.classifier.classify(text).await else {
        return;
    };
    info!(
        user_id,
        label = %decision.label,
        confidence = decision.confidence,
        prohibited = decision.is_prohibited,
        "ai moderation decision"
    );

    // 6. Accept gate: verdict, confidence, label set.
    if !decision.is_prohibited || decision.confidence < config.ai_confidence_threshold {
        return;
    }
    let allowed = config
        .ai_prohibited_labels
        .split(',')
        .map(str::trim)
        .any(|label| !label.is_empty() && label == decision.label);
    if !allowed {
        return;
    }

    punish(bot, app, msg, ModerationReason::Ai, None, Some(&decision)).await;
}

/// The punishment sequence: forward → delete → mute → group notice →
/// admin card → audit event. No step cancels the others.
pub async fn punish(
    bot: &Bot,
    app: &App,
    msg: &Message,
    reason: ModerationReason,
    matched_word: Option<&str>,
    decision: Option<&AiDecision>,
) {
    let Some(from) = msg.from.as_ref() else {
        return;
    };
    let user_id = from.id.0 as i64;
    let now = Utc::now();
    let until = now + Duration::minutes(app.settings.mute_minutes());
    let until_str = format_until(until, app.tz);

    let Some(admin_id) = app.settings.primary_admin_id() else {
        error!("no admin id configured, skipping punishment");
        return;
    };
    let admin_chat = ChatId(admin_id);
    let group = app.group_id();

    // Keep the profile fresh; the admin card reads phone/username from it.
    if let Err(e) = app.store.upsert_profile(
        user_id,
        &from.first_name,
        from.last_name.as_deref(),
        from.username.as_deref(),
        None,
        now,
    ) {
        warn!(user_id, error = %e, "profile upsert failed during punishment");
    }
    let profile = app.store.profile(user_id).ok().flatten();

    // 1. Forward the evidence before deleting it.
    if let Err(e) = bot.forward_message(admin_chat, group, msg.id).await {
        warn!(user_id, error = %e, "failed to forward offending message");
    }

    // 2. Delete the offending message.
    if let Err(e) = bot.delete_message(group, msg.id).await {
        warn!(user_id, error = %e, "failed to delete offending message");
    }

    // 3. Mute until the deadline.
    if let Err(e) = bot
        .restrict_chat_member(
            group,
            UserId(user_id as u64),
            teloxide::types::ChatPermissions::empty(),
        )
        .until_date(until)
        .await
    {
        warn!(user_id, error = %e, "failed to mute user");
    }

    // 4. Group notice, throttled per user. Admin messages are never
    //    throttled.
    if app.throttle.should_notify(user_id, now) {
        let notice = render_mute_notice(user_id, &from.full_name(), &until_str);
        if let Err(e) = bot
            .send_message(group, notice)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!(user_id, error = %e, "failed to send group mute notice");
        }
    }

    // 5. Admin card with identity and the reason details.
    let excerpt: String = msg
        .text()
        .or(msg.caption())
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    let card = match reason {
        ModerationReason::Keyword => keyword_admin_card(
            user_id,
            &from.full_name(),
            from.username.as_deref(),
            profile.as_ref(),
            matched_word.unwrap_or_default(),
            &until_str,
            app.config().group_id,
        ),
        ModerationReason::Ai => ai_admin_card(
            user_id,
            &from.full_name(),
            from.username.as_deref(),
            profile.as_ref(),
            decision,
            &until_str,
            &excerpt,
        ),
    };
    if let Err(e) = bot
        .send_message(admin_chat, card)
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!(user_id, error = %e, "failed to send admin card");
    }

    // 6. Audit record, written last so it reflects reality.
    let event = NewModerationEvent {
        group_id: app.config().group_id,
        user_id,
        message_id: msg.id.0 as i64,
        action: ModerationAction::Muted,
        reason_type: reason,
        matched_word: matched_word.map(str::to_string),
        ai_label: decision.map(|d| d.label.clone()),
        ai_confidence: decision.map(|d| d.confidence),
        ai_summary: decision.map(|d| d.reason.clone()),
    };
    if let Err(e) = app.store.append_moderation_event(&event, now) {
        error!(user_id, error = %e, "failed to persist moderation event");
    }
    if let Err(e) = app.store.stamp_moderation(user_id, now) {
        warn!(user_id, error = %e, "failed to stamp last moderation time");
    }
}

fn identity_block(
    user_id: i64,
    full_name: &str,
    username: Option<&str>,
    profile: Option<&UserProfile>,
) -> String {
    let name = if full_name.is_empty() {
        format!("ID:{user_id}")
    } else {
        full_name.to_string()
    };
    let username = username.or_else(|| profile.and_then(|p| p.username.as_deref()));
    let username_display = username
        .map(|u| format!("@{}", escape(u)))
        .unwrap_or_else(|| "—".to_string());
    let phone_display = profile
        .and_then(|p| p.phone_number.as_deref())
        .map(escape)
        .unwrap_or_else(|| "—".to_string());
    format!(
        "👤 User: {link}\n\
         • Full name: {name}\n\
         • Username: {username_display}\n\
         • ID: <code>{user_id}</code>\n\
         • Phone: {phone_display}",
        link = html_mention(user_id, &name),
        name = escape(&name),
    )
}

fn keyword_admin_card(
    user_id: i64,
    full_name: &str,
    username: Option<&str>,
    profile: Option<&UserProfile>,
    matched_word: &str,
    until_str: &str,
    group_id: i64,
) -> String {
    format!(
        "🚫 Prohibited word used\n\n{identity}\n\n\
         🧾 Reason: <b>{word}</b>\n\
         ⏳ Restricted until: <b>{until}</b>\n\n\
         Group: <code>{group_id}</code>",
        identity = identity_block(user_id, full_name, username, profile),
        word = escape(matched_word),
        until = escape(until_str),
    )
}

fn ai_admin_card(
    user_id: i64,
    full_name: &str,
    username: Option<&str>,
    profile: Option<&UserProfile>,
    decision: Option<&AiDecision>,
    until_str: &str,
    excerpt: &str,
) -> String {
    let label = decision.map(|d| d.label.as_str()).unwrap_or("none");
    let confidence = decision.map(|d| d.confidence).unwrap_or(0.0);
    let reason = decision.map(|d| d.reason.as_str()).unwrap_or("");
    format!(
        "🤖 AI moderation\n\n{identity}\n\n\
         🧾 Detected topic: <b>{label}</b>\n\
         📈 Confidence: <b>{confidence:.2}</b>\n\
         📝 Reason: {reason}\n\n\
         ⏳ Restricted until: <b>{until}</b>\n\n\
         🧩 Text: <code>{excerpt}</code>",
        identity = identity_block(user_id, full_name, username, profile),
        label = escape(label),
        reason = escape(reason),
        until = escape(until_str),
        excerpt = escape(excerpt),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_suppresses_within_window() {
        let throttle = NotifyThrottle::new(30);
        let now = Utc::now();
        assert!(throttle.should_notify(1, now));
        assert!(!throttle.should_notify(1, now + Duration::seconds(10)));
        assert!(throttle.should_notify(1, now + Duration::seconds(31)));
    }

    #[test]
    fn throttle_is_per_user() {
        let throttle = NotifyThrottle::new(30);
        let now = Utc::now();
        assert!(throttle.should_notify(1, now));
        assert!(throttle.should_notify(2, now));
    }

    #[test]
    fn format_until_renders_in_local_time() {
        let tz: Tz = "Asia/Tashkent".parse().unwrap();
        let utc = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        // Tashkent is UTC+5.
        assert_eq!(format_until(utc, tz), "2026-03-01 15:00");
    }

    #[test]
    fn keyword_card_contains_identity_and_word() {
        let card = keyword_admin_card(100, "Eve Adams", Some("eve"), None, "casino", "2026-03-01 15:00", -1001);
        assert!(card.contains("tg://user?id=100"));
        assert!(card.contains("@eve"));
        assert!(card.contains("<b>casino</b>"));
        assert!(card.contains("<code>-1001</code>"));
    }

    #[test]
    fn ai_card_escapes_excerpt() {
        let decision = AiDecision {
            is_prohibited: true,
            label: "gambling".into(),
            confidence: 0.91,
            reason: "promotes betting".into(),
        };
        let card = ai_admin_card(
            100,
            "Eve",
            None,
            None,
            Some(&decision),
            "2026-03-01 15:00",
            "play <b>now</b>",
        );
        assert!(card.contains("&lt;b&gt;now&lt;/b&gt;"));
        assert!(card.contains("<b>gambling</b>"));
        assert!(card.contains("0.91"));
    }
}
