use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Verification lifecycle. Advances monotonically except for the rejoin
/// reset back to `JoinedLocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    JoinedLocked,
    WaitingDmConfirm,
    ConfirmedUnlocked,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::JoinedLocked => "JOINED_LOCKED",
            SessionState::WaitingDmConfirm => "WAITING_DM_CONFIRM",
            SessionState::ConfirmedUnlocked => "CONFIRMED_UNLOCKED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "JOINED_LOCKED" => Ok(SessionState::JoinedLocked),
            "WAITING_DM_CONFIRM" => Ok(SessionState::WaitingDmConfirm),
            "CONFIRMED_UNLOCKED" => Ok(SessionState::ConfirmedUnlocked),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

/// A permanently whitelisted group member. Never mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovedMember {
    pub group_id: i64,
    pub user_id: i64,
    pub approved_at: DateTime<Utc>,
}

/// One user's verification attempt in the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSession {
    pub id: Uuid,
    pub group_id: i64,
    pub user_id: i64,
    pub state: SessionState,
    pub magic_word: String,
    pub welcome_message_id: Option<i32>,
    pub reminder_count: i64,
    pub remind_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Profile data refreshed on every interaction we see from the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub last_ai_check_at: Option<DateTime<Utc>>,
    pub last_moderation_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name).trim().to_string(),
            None => self.first_name.clone(),
        }
    }
}

/// Whether a lexicon entry matches as a single token or as a phrase
/// substring. `Phrase` iff the normalized form contains inner whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    Token,
    Phrase,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MatchKind::Token => "TOKEN",
            MatchKind::Phrase => "PHRASE",
        })
    }
}

impl std::str::FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TOKEN" => Ok(MatchKind::Token),
            "PHRASE" => Ok(MatchKind::Phrase),
            other => Err(format!("unknown match kind: {other}")),
        }
    }
}

/// One prohibited lexicon entry. `word` is the normalized, unique form;
/// `original` preserves what the admin typed for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProhibitedWord {
    pub id: i64,
    pub word: String,
    pub original: Option<String>,
    pub enabled: bool,
    pub match_kind: MatchKind,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
}

impl ProhibitedWord {
    /// Display form: the admin's original spelling, falling back to the
    /// normalized word.
    pub fn display(&self) -> &str {
        self.original.as_deref().unwrap_or(&self.word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationAction {
    None,
    Muted,
}

impl std::fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModerationAction::None => "NONE",
            ModerationAction::Muted => "MUTED",
        })
    }
}

impl std::str::FromStr for ModerationAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(ModerationAction::None),
            "MUTED" => Ok(ModerationAction::Muted),
            other => Err(format!("unknown moderation action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationReason {
    Keyword,
    Ai,
}

impl std::fmt::Display for ModerationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModerationReason::Keyword => "KEYWORD",
            ModerationReason::Ai => "AI",
        })
    }
}

impl std::str::FromStr for ModerationReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "KEYWORD" => Ok(ModerationReason::Keyword),
            "AI" => Ok(ModerationReason::Ai),
            other => Err(format!("unknown moderation reason: {other}")),
        }
    }
}

/// Audit-log entry for one punished message (append-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewModerationEvent {
    pub group_id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub action: ModerationAction,
    pub reason_type: ModerationReason,
    pub matched_word: Option<String>,
    pub ai_label: Option<String>,
    pub ai_confidence: Option<f64>,
    pub ai_summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn session_state_roundtrips() {
        for state in [
            SessionState::JoinedLocked,
            SessionState::WaitingDmConfirm,
            SessionState::ConfirmedUnlocked,
        ] {
            assert_eq!(SessionState::from_str(&state.to_string()).unwrap(), state);
        }
        assert!(SessionState::from_str("LOCKED").is_err());
    }

    #[test]
    fn match_kind_roundtrips() {
        assert_eq!(MatchKind::from_str("TOKEN").unwrap(), MatchKind::Token);
        assert_eq!(MatchKind::from_str("PHRASE").unwrap(), MatchKind::Phrase);
        assert!(MatchKind::from_str("token").is_err());
    }

    #[test]
    fn profile_full_name_joins_parts() {
        let mut profile = UserProfile {
            user_id: 1,
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
            username: None,
            phone_number: None,
            last_ai_check_at: None,
            last_moderation_at: None,
            updated_at: Utc::now(),
        };
        assert_eq!(profile.full_name(), "Ada Lovelace");
        profile.last_name = None;
        assert_eq!(profile.full_name(), "Ada");
    }

    #[test]
    fn word_display_prefers_original() {
        let word = ProhibitedWord {
            id: 1,
            word: "1plusbet".into(),
            original: Some("1+Bet".into()),
            enabled: true,
            match_kind: MatchKind::Token,
            created_at: Utc::now(),
            created_by: 0,
        };
        assert_eq!(word.display(), "1+Bet");
    }
}
