//! Central shared state — built once in `main` and passed as `Arc<App>`
//! through the dispatcher's dependency injection. There are no globals; every
//! handler receives everything it needs from here.

use chrono_tz::Tz;
use dashmap::DashMap;
use gatewarden_classifier::Classifier;
use gatewarden_core::config::Config;
use gatewarden_core::settings::RuntimeSettings;
use gatewarden_lexicon::LexiconCache;
use gatewarden_store::Store;
use teloxide::types::ChatId;

use crate::moderation::NotifyThrottle;

/// Multi-step admin UI prompt, keyed by admin chat id. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminPrompt {
    AddWord,
    RemoveWord,
    Search,
    BulkImport,
    EditSetting(String),
}

/// Per-admin-chat UI state.
#[derive(Debug, Clone, Default)]
pub struct AdminChatState {
    pub prompt: Option<AdminPrompt>,
    pub last_list_page: i64,
}

pub struct App {
    pub settings: RuntimeSettings,
    pub store: Store,
    pub lexicon: LexiconCache,
    pub classifier: Classifier,
    pub throttle: NotifyThrottle,
    pub admin_chats: DashMap<i64, AdminChatState>,
    /// Bot username, for building `t.me/<bot>?start=...` deep links.
    pub bot_username: String,
    /// Parsed `TIMEZONE` for rendering mute-until timestamps.
    pub tz: Tz,
}

impl App {
    pub fn config(&self) -> &Config {
        self.settings.config()
    }

    pub fn group_id(&self) -> ChatId {
        ChatId(self.config().group_id)
    }

    pub fn secret(&self) -> &str {
        &self.config().secret_key
    }

    /// Whether `chat_id` currently has an admin prompt open.
    pub fn has_prompt(&self, chat_id: i64) -> bool {
        self.admin_chats
            .get(&chat_id)
            .is_some_and(|state| state.prompt.is_some())
    }

    pub fn set_prompt(&self, chat_id: i64, prompt: AdminPrompt) {
        self.admin_chats.entry(chat_id).or_default().prompt = Some(prompt);
    }

    pub fn take_prompt(&self, chat_id: i64) -> Option<AdminPrompt> {
        self.admin_chats
            .get_mut(&chat_id)
            .and_then(|mut state| state.prompt.take())
    }

    pub fn remember_list_page(&self, chat_id: i64, page: i64) {
        self.admin_chats.entry(chat_id).or_default().last_list_page = page;
    }

    pub fn last_list_page(&self, chat_id: i64) -> i64 {
        self.admin_chats
            .get(&chat_id)
            .map(|state| state.last_list_page)
            .filter(|page| *page >= 1)
            .unwrap_or(1)
    }
}
