use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Immutable configuration snapshot loaded once at startup.
///
/// Sources, lowest to highest precedence: `gatewarden.toml` (optional),
/// then environment variables with the same names (`BOT_TOKEN`, `GROUP_ID`,
/// `REMIND_AFTER_MIN`, ...). Runtime-overridable values are read through
/// [`crate::settings::RuntimeSettings`], never from here directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot_token: String,
    pub group_id: i64,
    pub secret_key: String,
    pub database_url: String,

    #[serde(default = "default_remind_after_min")]
    pub remind_after_min: i64,
    #[serde(default = "default_expire_after_min")]
    pub expire_after_min: i64,
    #[serde(default = "default_max_reminders")]
    pub max_reminders: i64,
    #[serde(default = "default_mute_minutes")]
    pub mute_minutes: i64,

    #[serde(default)]
    pub admin_id: Option<i64>,
    /// Comma-separated extra admin ids; unioned with `admin_id`.
    #[serde(default)]
    pub admin_ids: Option<String>,
    #[serde(default = "bool_true")]
    pub admin_panel_enabled: bool,

    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "bool_true")]
    pub case_insensitive: bool,
    #[serde(default)]
    pub prohibited_words_path: Option<String>,

    #[serde(default = "bool_true")]
    pub ai_moderation_enabled: bool,
    #[serde(default = "default_sample_rate")]
    pub ai_moderation_sample_rate: f64,
    #[serde(default = "default_min_chars")]
    pub ai_moderation_min_chars: usize,
    #[serde(default = "default_cooldown_sec")]
    pub ai_moderation_cooldown_sec: i64,
    #[serde(default = "default_prohibited_labels")]
    pub ai_prohibited_labels: String,
    #[serde(default = "default_confidence_threshold")]
    pub ai_confidence_threshold: f64,

    #[serde(default)]
    pub openrouter_api_key: Option<String>,
    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,
    #[serde(default = "default_openrouter_timeout_sec")]
    pub openrouter_timeout_sec: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn bool_true() -> bool {
    true
}
fn default_remind_after_min() -> i64 {
    10
}
fn default_expire_after_min() -> i64 {
    60
}
fn default_max_reminders() -> i64 {
    2
}
fn default_mute_minutes() -> i64 {
    10
}
fn default_timezone() -> String {
    "Asia/Tashkent".to_string()
}
fn default_sample_rate() -> f64 {
    1.0
}
fn default_min_chars() -> usize {
    12
}
fn default_cooldown_sec() -> i64 {
    30
}
fn default_prohibited_labels() -> String {
    "gambling,fraud".to_string()
}
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_openrouter_model() -> String {
    "openai/gpt-4o-mini".to_string()
}
fn default_openrouter_timeout_sec() -> u64 {
    8
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Config {
    /// Load config from an optional TOML file with env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("gatewarden.toml");
        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::raw().lowercase(true))
            .extract()
            .map_err(|e| crate::error::GateError::Config(e.to_string()))?;
        Ok(config)
    }

    /// SQLite path extracted from `database_url` (`sqlite://` prefix optional).
    pub fn database_path(&self) -> &str {
        self.database_url
            .strip_prefix("sqlite://")
            .unwrap_or(&self.database_url)
    }

    /// Admin roster from the env snapshot: `admin_id` first, then the ids
    /// parsed out of the `admin_ids` CSV, deduplicated in order. The first
    /// entry is the primary admin (receives forwards and audit cards).
    pub fn admin_roster(&self) -> Vec<i64> {
        roster(self.admin_id, self.admin_ids.as_deref())
    }
}

/// Parse the admin roster from a fixed id plus a CSV list.
///
/// Unparsable CSV items are skipped, duplicates collapse, order is kept so
/// index 0 stays the primary admin.
pub fn roster(admin_id: Option<i64>, admin_ids: Option<&str>) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::new();
    if let Some(id) = admin_id {
        out.push(id);
    }
    if let Some(csv) = admin_ids {
        for item in csv.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if let Ok(id) = item.parse::<i64>() {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_unions_and_dedupes() {
        let ids = roster(Some(10), Some("20, 10,abc, 30,"));
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn roster_primary_is_admin_id() {
        let ids = roster(Some(7), Some("1,2"));
        assert_eq!(ids[0], 7);
    }

    #[test]
    fn roster_empty_when_unset() {
        assert!(roster(None, None).is_empty());
    }

    #[test]
    fn database_path_strips_scheme() {
        let mut cfg = sample();
        cfg.database_url = "sqlite:///var/lib/gatewarden.db".into();
        assert_eq!(cfg.database_path(), "/var/lib/gatewarden.db");
        cfg.database_url = "gatewarden.db".into();
        assert_eq!(cfg.database_path(), "gatewarden.db");
    }

    fn sample() -> Config {
        Config {
            bot_token: "token".into(),
            group_id: -100,
            secret_key: "secret".into(),
            database_url: "gatewarden.db".into(),
            remind_after_min: default_remind_after_min(),
            expire_after_min: default_expire_after_min(),
            max_reminders: default_max_reminders(),
            mute_minutes: default_mute_minutes(),
            admin_id: None,
            admin_ids: None,
            admin_panel_enabled: true,
            timezone: default_timezone(),
            case_insensitive: true,
            prohibited_words_path: None,
            ai_moderation_enabled: true,
            ai_moderation_sample_rate: default_sample_rate(),
            ai_moderation_min_chars: default_min_chars(),
            ai_moderation_cooldown_sec: default_cooldown_sec(),
            ai_prohibited_labels: default_prohibited_labels(),
            ai_confidence_threshold: default_confidence_threshold(),
            openrouter_api_key: None,
            openrouter_model: default_openrouter_model(),
            openrouter_timeout_sec: default_openrouter_timeout_sec(),
            log_level: default_log_level(),
        }
    }

    #[test]
    fn sample_is_consistent() {
        let cfg = sample();
        assert!(cfg.ai_moderation_enabled);
        assert_eq!(cfg.max_reminders, 2);
    }
}
