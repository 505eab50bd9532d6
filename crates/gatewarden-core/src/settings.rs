//! Runtime-overridable settings.
//!
//! The startup [`Config`] stays immutable. Admin edits land in an overrides
//! map keyed by the setting name; every reader pulls the effective value
//! through the accessors here, so there is no global mutable configuration.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::config::{roster, Config};
use crate::error::{GateError, Result};

/// Setting keys an admin may override at runtime.
pub const SUPPORTED_KEYS: &[&str] = &[
    "ADMIN_IDS",
    "AI_MODERATION_ENABLED",
    "EXPIRE_AFTER_MIN",
    "MAX_REMINDERS",
    "MUTE_MINUTES",
    "REMIND_AFTER_MIN",
];

/// Immutable config snapshot plus the admin override map.
pub struct RuntimeSettings {
    config: Config,
    overrides: RwLock<HashMap<String, String>>,
}

impl RuntimeSettings {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// The startup snapshot, for values that are never overridden.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Install persisted overrides loaded from the store at startup.
    ///
    /// Values that fail coercion are skipped with a warning rather than
    /// aborting startup.
    pub fn load(&self, values: HashMap<String, String>) {
        for (key, value) in values {
            if let Err(e) = self.apply(&key, &value) {
                tracing::warn!(%key, error = %e, "ignoring stored setting override");
            }
        }
    }

    /// Validate and install one override. The caller persists it separately.
    pub fn apply(&self, key: &str, value: &str) -> Result<()> {
        if !SUPPORTED_KEYS.contains(&key) {
            return Err(GateError::UnknownSetting(key.to_string()));
        }
        coerce(key, value)?;
        self.overrides
            .write()
            .unwrap()
            .insert(key.to_string(), value.trim().to_string());
        Ok(())
    }

    /// Effective values of every supported key, overrides applied.
    pub fn current(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("REMIND_AFTER_MIN".into(), self.remind_after_min().to_string());
        out.insert("EXPIRE_AFTER_MIN".into(), self.expire_after_min().to_string());
        out.insert("MAX_REMINDERS".into(), self.max_reminders().to_string());
        out.insert("MUTE_MINUTES".into(), self.mute_minutes().to_string());
        out.insert(
            "AI_MODERATION_ENABLED".into(),
            self.ai_moderation_enabled().to_string(),
        );
        let ids: Vec<String> = self.admin_roster().iter().map(|id| id.to_string()).collect();
        out.insert("ADMIN_IDS".into(), ids.join(","));
        out
    }

    pub fn remind_after_min(&self) -> i64 {
        self.int("REMIND_AFTER_MIN", self.config.remind_after_min)
    }

    pub fn expire_after_min(&self) -> i64 {
        self.int("EXPIRE_AFTER_MIN", self.config.expire_after_min)
    }

    pub fn max_reminders(&self) -> i64 {
        self.int("MAX_REMINDERS", self.config.max_reminders)
    }

    pub fn mute_minutes(&self) -> i64 {
        self.int("MUTE_MINUTES", self.config.mute_minutes)
    }

    pub fn ai_moderation_enabled(&self) -> bool {
        let overrides = self.overrides.read().unwrap();
        match overrides.get("AI_MODERATION_ENABLED") {
            Some(raw) => parse_bool(raw).unwrap_or(self.config.ai_moderation_enabled),
            None => self.config.ai_moderation_enabled,
        }
    }

    /// Admin roster with an `ADMIN_IDS` override replacing the env CSV.
    /// `admin_id` always stays first (it is the primary admin).
    pub fn admin_roster(&self) -> Vec<i64> {
        let overrides = self.overrides.read().unwrap();
        let csv = overrides
            .get("ADMIN_IDS")
            .map(String::as_str)
            .or(self.config.admin_ids.as_deref());
        roster(self.config.admin_id, csv)
    }

    pub fn primary_admin_id(&self) -> Option<i64> {
        self.admin_roster().first().copied()
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_roster().contains(&user_id)
    }

    fn int(&self, key: &str, fallback: i64) -> i64 {
        let overrides = self.overrides.read().unwrap();
        overrides
            .get(key)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(fallback)
    }
}

/// Check that `value` coerces to the type `key` expects.
fn coerce(key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    match key {
        "REMIND_AFTER_MIN" | "EXPIRE_AFTER_MIN" | "MAX_REMINDERS" | "MUTE_MINUTES" => {
            let n: i64 = value.parse().map_err(|_| GateError::InvalidSetting {
                key: key.to_string(),
                reason: "expected an integer".to_string(),
            })?;
            if n < 0 {
                return Err(GateError::InvalidSetting {
                    key: key.to_string(),
                    reason: "must not be negative".to_string(),
                });
            }
            Ok(())
        }
        "AI_MODERATION_ENABLED" => parse_bool(value).map(|_| ()).ok_or_else(|| {
            GateError::InvalidSetting {
                key: key.to_string(),
                reason: "expected a boolean".to_string(),
            }
        }),
        "ADMIN_IDS" => {
            for item in value.split(',') {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                item.parse::<i64>().map_err(|_| GateError::InvalidSetting {
                    key: key.to_string(),
                    reason: format!("'{item}' is not a user id"),
                })?;
            }
            Ok(())
        }
        _ => Err(GateError::UnknownSetting(key.to_string())),
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            bot_token: "t".into(),
            group_id: -1,
            secret_key: "s".into(),
            database_url: "db".into(),
            remind_after_min: 10,
            expire_after_min: 60,
            max_reminders: 2,
            mute_minutes: 10,
            admin_id: Some(1),
            admin_ids: Some("2,3".into()),
            admin_panel_enabled: true,
            timezone: "Asia/Tashkent".into(),
            case_insensitive: true,
            prohibited_words_path: None,
            ai_moderation_enabled: true,
            ai_moderation_sample_rate: 1.0,
            ai_moderation_min_chars: 12,
            ai_moderation_cooldown_sec: 30,
            ai_prohibited_labels: "gambling,fraud".into(),
            ai_confidence_threshold: 0.7,
            openrouter_api_key: None,
            openrouter_model: "openai/gpt-4o-mini".into(),
            openrouter_timeout_sec: 8,
            log_level: "INFO".into(),
        }
    }

    #[test]
    fn override_changes_effective_value() {
        let settings = RuntimeSettings::new(config());
        assert_eq!(settings.remind_after_min(), 10);
        settings.apply("REMIND_AFTER_MIN", "5").unwrap();
        assert_eq!(settings.remind_after_min(), 5);
    }

    #[test]
    fn bad_coercion_is_rejected_and_not_stored() {
        let settings = RuntimeSettings::new(config());
        assert!(settings.apply("MAX_REMINDERS", "lots").is_err());
        assert_eq!(settings.max_reminders(), 2);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let settings = RuntimeSettings::new(config());
        assert!(matches!(
            settings.apply("SECRET_KEY", "nope"),
            Err(GateError::UnknownSetting(_))
        ));
    }

    #[test]
    fn admin_ids_override_keeps_primary_first() {
        let settings = RuntimeSettings::new(config());
        assert_eq!(settings.admin_roster(), vec![1, 2, 3]);
        settings.apply("ADMIN_IDS", "9,8").unwrap();
        assert_eq!(settings.admin_roster(), vec![1, 9, 8]);
        assert_eq!(settings.primary_admin_id(), Some(1));
    }

    #[test]
    fn bool_override_accepts_usual_spellings() {
        let settings = RuntimeSettings::new(config());
        settings.apply("AI_MODERATION_ENABLED", "off").unwrap();
        assert!(!settings.ai_moderation_enabled());
        settings.apply("AI_MODERATION_ENABLED", "Yes").unwrap();
        assert!(settings.ai_moderation_enabled());
    }

    #[test]
    fn load_skips_bad_values() {
        let settings = RuntimeSettings::new(config());
        let mut stored = HashMap::new();
        stored.insert("MUTE_MINUTES".to_string(), "25".to_string());
        stored.insert("MAX_REMINDERS".to_string(), "banana".to_string());
        settings.load(stored);
        assert_eq!(settings.mute_minutes(), 25);
        assert_eq!(settings.max_reminders(), 2);
    }
}
