//! Gatewarden — membership verification and content moderation daemon for a
//! single Telegram group.
//!
//! Composition root: load config, open the store, seed and index the
//! lexicon, construct the classifier, then run the long-polling dispatcher
//! with the reminder worker alongside.

use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use tokio::sync::watch;
use tracing::{info, warn};

use gatewarden_classifier::Classifier;
use gatewarden_core::config::Config;
use gatewarden_core::settings::RuntimeSettings;
use gatewarden_lexicon::seed::seed_from_file_if_empty;
use gatewarden_lexicon::LexiconCache;
use gatewarden_store::Store;

mod app;
mod handlers;
mod moderation;
mod reminder;
mod verify;

use app::App;
use moderation::NotifyThrottle;

/// Group-notification suppression window.
const THROTTLE_WINDOW_SECONDS: i64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("GATEWARDEN_CONFIG").ok();
    let config = Config::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.to_lowercase().into()),
        )
        .init();

    info!("starting gatewarden in polling mode");

    let store = Store::open(config.database_path())?;
    seed_from_file_if_empty(
        &store,
        config.prohibited_words_path.as_deref(),
        config.case_insensitive,
        config.admin_id.unwrap_or(0),
    )?;

    let settings = RuntimeSettings::new(config.clone());
    settings.load(store.load_settings()?);

    let lexicon = LexiconCache::new(config.case_insensitive);
    lexicon.refresh(&store)?;

    let classifier = Classifier::new(
        config.openrouter_api_key.clone(),
        config.openrouter_model.clone(),
        config.openrouter_timeout_sec,
        config.ai_prohibited_labels.clone(),
    )?;

    let tz: Tz = config.timezone.parse().unwrap_or_else(|_| {
        warn!(timezone = %config.timezone, "unknown timezone, falling back to UTC");
        chrono_tz::UTC
    });

    let bot = Bot::new(&config.bot_token);
    if let Err(e) = bot
        .set_my_commands([BotCommand::new("start", "Start verification")])
        .await
    {
        warn!(error = %e, "failed to register bot commands");
    }
    let me = bot.get_me().await?;

    let app = Arc::new(App {
        settings,
        store,
        lexicon,
        classifier,
        throttle: NotifyThrottle::new(THROTTLE_WINDOW_SECONDS),
        admin_chats: DashMap::new(),
        bot_username: me.username().to_string(),
        tz,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reminder_task = tokio::spawn(reminder::run(bot.clone(), Arc::clone(&app), shutdown_rx));

    let handler = dptree::entry()
        .branch(Update::filter_chat_member().endpoint(handlers::group::on_chat_member))
        .branch(Update::filter_callback_query().endpoint(handlers::on_callback))
        .branch(Update::filter_message().endpoint(handlers::on_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![Arc::clone(&app)])
        .default_handler(|_upd| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // The dispatcher returned (ctrl-c): stop the reminder worker and let it
    // finish its current tick.
    let _ = shutdown_tx.send(true);
    let _ = reminder_task.await;
    info!("gatewarden stopped");
    Ok(())
}
