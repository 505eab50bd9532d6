//! Background reminder worker.
//!
//! Ticks every ~20 seconds, scans for due verification sessions, nudges the
//! users who have not pressed the agree button, and deschedules sessions
//! whose user already left. All of a tick's row updates commit in one
//! transaction; one user's send failure never aborts the tick, and a tick
//! failure never kills the worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gatewarden_core::texts::render_reminder;
use gatewarden_store::{ReminderUpdate, VerificationSession};
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, ParseMode, UserId};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app::App;
use crate::verify::agree_keyboard;

const TICK: Duration = Duration::from_secs(20);

/// Run until `shutdown` flips to true. Uncancellable mid-tick, cancellable
/// between ticks.
pub async fn run(bot: Bot, app: Arc<App>, mut shutdown: watch::Receiver<bool>) {
    info!("reminder worker started");
    let mut interval = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = tick(&bot, &app).await {
                    error!(error = %e, "reminder tick failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("reminder worker shutting down");
                    break;
                }
            }
        }
    }
}

async fn tick(bot: &Bot, app: &App) -> gatewarden_store::Result<()> {
    let now = Utc::now();
    let max_reminders = app.settings.max_reminders();
    let due = app.store.due_sessions(now, max_reminders)?;

    let mut updates = Vec::with_capacity(due.len());
    for session in &due {
        if let Some(update) = process_due_session(bot, app, session, max_reminders).await {
            updates.push(update);
        }
    }
    app.store.apply_reminder_updates(&updates, Utc::now())?;
    Ok(())
}

/// Decide what happens to one due session. `None` leaves the row untouched
/// so the next tick retries it.
async fn process_due_session(
    bot: &Bot,
    app: &App,
    session: &VerificationSession,
    max_reminders: i64,
) -> Option<ReminderUpdate> {
    let mut display_name = "User".to_string();
    match bot
        .get_chat_member(app.group_id(), UserId(session.user_id as u64))
        .await
    {
        Ok(member) => {
            display_name = member.user.full_name();
            if matches!(member.kind, ChatMemberKind::Left | ChatMemberKind::Banned(_)) {
                // The user is gone; park the session so it is never
                // selected again.
                info!(user_id = session.user_id, "descheduling reminders for absent user");
                return Some(ReminderUpdate {
                    id: session.id,
                    reminder_count: max_reminders,
                    remind_at: session.expires_at,
                });
            }
        }
        Err(e) => {
            warn!(user_id = session.user_id, error = %e, "member lookup failed for reminder");
        }
    }

    match bot
        .send_message(
            app.group_id(),
            render_reminder(session.user_id, &display_name),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(agree_keyboard(app.secret(), session))
        .await
    {
        Ok(_) => {
            info!(user_id = session.user_id, count = session.reminder_count + 1, "sent reminder");
            let next = Utc::now() + chrono::Duration::minutes(app.settings.remind_after_min());
            Some(ReminderUpdate {
                id: session.id,
                reminder_count: session.reminder_count + 1,
                // remind_at stays within the session lifetime.
                remind_at: next.min(session.expires_at),
            })
        }
        Err(e) => {
            warn!(user_id = session.user_id, error = %e, "failed to send reminder");
            None
        }
    }
}
