use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{
    MatchKind, NewModerationEvent, ProhibitedWord, SessionState, UserProfile, VerificationSession,
};

/// Thread-safe store over a single SQLite connection.
///
/// A `Mutex<Connection>` keeps every operation a short critical section;
/// handlers read, mutate, and commit in one call, so the reminder worker and
/// the event handlers cannot lose each other's updates.
pub struct Store {
    db: Mutex<Connection>,
}

/// Row update computed by one reminder-worker pass for one session.
#[derive(Debug, Clone)]
pub struct ReminderUpdate {
    pub id: Uuid,
    pub reminder_count: i64,
    pub remind_at: DateTime<Utc>,
}

/// Fixed-width RFC3339 so stored timestamps compare correctly as text.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

const SESSION_COLUMNS: &str = "id, group_id, user_id, state, magic_word, welcome_message_id,
        reminder_count, remind_at, expires_at, created_at, updated_at";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<VerificationSession> {
    let id: String = row.get(0)?;
    let state: String = row.get(3)?;
    Ok(VerificationSession {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        group_id: row.get(1)?,
        user_id: row.get(2)?,
        state: SessionState::from_str(&state).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        magic_word: row.get(4)?,
        welcome_message_id: row.get(5)?,
        reminder_count: row.get(6)?,
        remind_at: parse_ts(&row.get::<_, String>(7)?)?,
        expires_at: parse_ts(&row.get::<_, String>(8)?)?,
        created_at: parse_ts(&row.get::<_, String>(9)?)?,
        updated_at: parse_ts(&row.get::<_, String>(10)?)?,
    })
}

const WORD_COLUMNS: &str = "id, word, original, enabled, match_kind, created_at, created_by";

fn row_to_word(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProhibitedWord> {
    let kind: String = row.get(4)?;
    Ok(ProhibitedWord {
        id: row.get(0)?,
        word: row.get(1)?,
        original: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        match_kind: MatchKind::from_str(&kind).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?,
        created_at: parse_ts(&row.get::<_, String>(5)?)?,
        created_by: row.get(6)?,
    })
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        username: row.get(3)?,
        phone_number: row.get(4)?,
        last_ai_check_at: parse_opt_ts(row.get(5)?)?,
        last_moderation_at: parse_opt_ts(row.get(6)?)?,
        updated_at: parse_ts(&row.get::<_, String>(7)?)?,
    })
}

impl Store {
    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::new(conn)
    }

    /// Wrap an already-open connection, initialising the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    // --- approved members --------------------------------------------------

    pub fn is_approved(&self, group_id: i64, user_id: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let found: Option<i64> = db
            .query_row(
                "SELECT 1 FROM approved_members WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whitelist a user. The UNIQUE constraint makes re-approval a no-op.
    pub fn mark_approved(&self, group_id: i64, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO approved_members (group_id, user_id, approved_at)
             VALUES (?1, ?2, ?3)",
            params![group_id, user_id, ts(now)],
        )?;
        Ok(())
    }

    // --- verification sessions ---------------------------------------------

    pub fn session_for_user(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<VerificationSession>> {
        let db = self.db.lock().unwrap();
        let session = db
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM verification_sessions
                     WHERE group_id = ?1 AND user_id = ?2"
                ),
                params![group_id, user_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn session_by_id(&self, id: Uuid) -> Result<Option<VerificationSession>> {
        let db = self.db.lock().unwrap();
        let session = db
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM verification_sessions WHERE id = ?1"),
                params![id.to_string()],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Create or reset the session for a joining user.
    ///
    /// A confirmed session is returned untouched. An unconfirmed one is reset
    /// to `JoinedLocked` with the fresh magic word and timers (the rejoin
    /// path). Otherwise a new row is inserted; `INSERT OR IGNORE` plus the
    /// read-back handles two handlers racing on the same join.
    pub fn upsert_session(
        &self,
        group_id: i64,
        user_id: i64,
        magic_word: &str,
        remind_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<VerificationSession> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM verification_sessions
                     WHERE group_id = ?1 AND user_id = ?2"
                ),
                params![group_id, user_id],
                row_to_session,
            )
            .optional()?;

        match existing {
            Some(session) if session.state == SessionState::ConfirmedUnlocked => {
                tx.commit()?;
                Ok(session)
            }
            Some(session) => {
                tx.execute(
                    "UPDATE verification_sessions
                     SET state = ?1, magic_word = ?2, reminder_count = 0,
                         remind_at = ?3, expires_at = ?4, updated_at = ?5
                     WHERE id = ?6",
                    params![
                        SessionState::JoinedLocked.to_string(),
                        magic_word,
                        ts(remind_at),
                        ts(expires_at),
                        ts(now),
                        session.id.to_string()
                    ],
                )?;
                let refreshed = tx.query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM verification_sessions WHERE id = ?1"),
                    params![session.id.to_string()],
                    row_to_session,
                )?;
                tx.commit()?;
                debug!(user_id, "verification session reset");
                Ok(refreshed)
            }
            None => {
                let id = Uuid::new_v4();
                tx.execute(
                    "INSERT OR IGNORE INTO verification_sessions
                     (id, group_id, user_id, state, magic_word, reminder_count,
                      remind_at, expires_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?8)",
                    params![
                        id.to_string(),
                        group_id,
                        user_id,
                        SessionState::JoinedLocked.to_string(),
                        magic_word,
                        ts(remind_at),
                        ts(expires_at),
                        ts(now)
                    ],
                )?;
                let session = tx.query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM verification_sessions
                         WHERE group_id = ?1 AND user_id = ?2"
                    ),
                    params![group_id, user_id],
                    row_to_session,
                )?;
                tx.commit()?;
                Ok(session)
            }
        }
    }

    /// Record the welcome message id, unless the session confirmed while the
    /// message was in flight.
    pub fn attach_welcome_message(
        &self,
        id: Uuid,
        message_id: i32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE verification_sessions
             SET welcome_message_id = ?1, updated_at = ?2
             WHERE id = ?3 AND state != ?4",
            params![
                message_id,
                ts(now),
                id.to_string(),
                SessionState::ConfirmedUnlocked.to_string()
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn set_session_state(
        &self,
        id: Uuid,
        state: SessionState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE verification_sessions SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state.to_string(), ts(now), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                what: format!("session {id}"),
            });
        }
        Ok(())
    }

    /// Terminal transition: confirm, and park the reminder columns so the
    /// worker never selects this row again.
    pub fn confirm_session(&self, id: Uuid, max_reminders: i64, now: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE verification_sessions
             SET state = ?1, reminder_count = ?2, remind_at = expires_at, updated_at = ?3
             WHERE id = ?4",
            params![
                SessionState::ConfirmedUnlocked.to_string(),
                max_reminders,
                ts(now),
                id.to_string()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                what: format!("session {id}"),
            });
        }
        Ok(())
    }

    /// Sessions the reminder worker should look at this tick.
    pub fn due_sessions(
        &self,
        now: DateTime<Utc>,
        max_reminders: i64,
    ) -> Result<Vec<VerificationSession>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM verification_sessions
             WHERE state != ?1 AND remind_at <= ?2
               AND reminder_count < ?3 AND expires_at > ?2
             ORDER BY remind_at"
        ))?;
        let rows = stmt.query_map(
            params![
                SessionState::ConfirmedUnlocked.to_string(),
                ts(now),
                max_reminders
            ],
            row_to_session,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Commit all of one tick's reminder bookkeeping atomically.
    pub fn apply_reminder_updates(
        &self,
        updates: &[ReminderUpdate],
        now: DateTime<Utc>,
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        for update in updates {
            tx.execute(
                "UPDATE verification_sessions
                 SET reminder_count = ?1, remind_at = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![
                    update.reminder_count,
                    ts(update.remind_at),
                    ts(now),
                    update.id.to_string()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // --- user profiles -----------------------------------------------------

    /// Refresh the profile from the latest sighting of the user.
    ///
    /// `phone_number` only overwrites a stored number when supplied — it
    /// comes exclusively from verified contact messages.
    pub fn upsert_profile(
        &self,
        user_id: i64,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
        phone_number: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_profiles
             (user_id, first_name, last_name, username, phone_number, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                 first_name   = excluded.first_name,
                 last_name    = excluded.last_name,
                 username     = excluded.username,
                 phone_number = COALESCE(excluded.phone_number, phone_number),
                 updated_at   = excluded.updated_at",
            params![user_id, first_name, last_name, username, phone_number, ts(now)],
        )?;
        Ok(())
    }

    pub fn profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let db = self.db.lock().unwrap();
        let profile = db
            .query_row(
                "SELECT user_id, first_name, last_name, username, phone_number,
                        last_ai_check_at, last_moderation_at, updated_at
                 FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Claim an AI-moderation slot for this user.
    ///
    /// Stamps `last_ai_check_at = now` and returns true only when the
    /// previous stamp is older than the cooldown. The check and the write are
    /// one UPDATE, so two concurrent messages cannot both claim the slot.
    pub fn try_stamp_ai_check(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        cooldown_sec: i64,
    ) -> Result<bool> {
        let cutoff = now - chrono::Duration::seconds(cooldown_sec);
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE user_profiles SET last_ai_check_at = ?1
             WHERE user_id = ?2
               AND (last_ai_check_at IS NULL OR last_ai_check_at <= ?3)",
            params![ts(now), user_id, ts(cutoff)],
        )?;
        Ok(changed == 1)
    }

    pub fn stamp_moderation(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE user_profiles SET last_moderation_at = ?1 WHERE user_id = ?2",
            params![ts(now), user_id],
        )?;
        Ok(())
    }

    // --- prohibited lexicon ------------------------------------------------

    /// Every enabled entry, in insertion order (phrase scan order).
    pub fn enabled_words(&self) -> Result<Vec<ProhibitedWord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {WORD_COLUMNS} FROM prohibited_words WHERE enabled = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_word)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn lexicon_is_empty(&self) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let found: Option<i64> = db
            .query_row("SELECT id FROM prohibited_words LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_none())
    }

    pub fn count_words(&self) -> Result<i64> {
        let db = self.db.lock().unwrap();
        Ok(db.query_row("SELECT COUNT(*) FROM prohibited_words", [], |row| row.get(0))?)
    }

    /// Newest-first page for the admin list view.
    pub fn list_words(&self, offset: i64, limit: i64) -> Result<Vec<ProhibitedWord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {WORD_COLUMNS} FROM prohibited_words
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], row_to_word)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn word_by_id(&self, id: i64) -> Result<Option<ProhibitedWord>> {
        let db = self.db.lock().unwrap();
        let word = db
            .query_row(
                &format!("SELECT {WORD_COLUMNS} FROM prohibited_words WHERE id = ?1"),
                params![id],
                row_to_word,
            )
            .optional()?;
        Ok(word)
    }

    pub fn word_by_norm(&self, word: &str) -> Result<Option<ProhibitedWord>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                &format!("SELECT {WORD_COLUMNS} FROM prohibited_words WHERE word = ?1"),
                params![word],
                row_to_word,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert a normalized entry; re-adding an existing word re-enables it
    /// and refreshes the display form.
    pub fn upsert_word(
        &self,
        word: &str,
        original: &str,
        match_kind: MatchKind,
        created_by: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO prohibited_words
             (word, original, enabled, match_kind, created_at, created_by)
             VALUES (?1, ?2, 1, ?3, ?4, ?5)
             ON CONFLICT(word) DO UPDATE SET enabled = 1, original = excluded.original",
            params![word, original, match_kind.to_string(), ts(now), created_by],
        )?;
        Ok(())
    }

    /// Seed rows `(normalized, original, kind)`, skipping ones already
    /// present. Returns how many were inserted.
    pub fn insert_words_ignore(
        &self,
        rows: &[(String, String, MatchKind)],
        created_by: i64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let mut inserted = 0;
        for (word, original, kind) in rows {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO prohibited_words
                 (word, original, enabled, match_kind, created_at, created_by)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5)",
                params![word, original, kind.to_string(), ts(now), created_by],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn set_word_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE prohibited_words SET enabled = ?1 WHERE id = ?2",
            params![enabled as i64, id],
        )?;
        Ok(changed == 1)
    }

    pub fn delete_word(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let changed = db.execute("DELETE FROM prohibited_words WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    }

    /// Substring search over the normalized form.
    pub fn search_words(&self, fragment: &str, limit: i64) -> Result<Vec<ProhibitedWord>> {
        let pattern = format!(
            "%{}%",
            fragment.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {WORD_COLUMNS} FROM prohibited_words
             WHERE word LIKE ?1 ESCAPE '\\' ORDER BY word LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![pattern, limit], row_to_word)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Display forms of all enabled entries, alphabetical by normalized word.
    pub fn export_enabled(&self) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT COALESCE(original, word) FROM prohibited_words
             WHERE enabled = 1 ORDER BY word",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // --- moderation events -------------------------------------------------

    pub fn append_moderation_event(
        &self,
        event: &NewModerationEvent,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO moderation_events
             (group_id, user_id, message_id, action, reason_type,
              matched_word, ai_label, ai_confidence, ai_summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.group_id,
                event.user_id,
                event.message_id,
                event.action.to_string(),
                event.reason_type.to_string(),
                event.matched_word,
                event.ai_label,
                event.ai_confidence,
                event.ai_summary,
                ts(now)
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn count_moderation_events(&self, group_id: i64, user_id: i64) -> Result<i64> {
        let db = self.db.lock().unwrap();
        Ok(db.query_row(
            "SELECT COUNT(*) FROM moderation_events WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
            |row| row.get(0),
        )?)
    }

    // --- app settings ------------------------------------------------------

    pub fn load_settings(&self) -> Result<HashMap<String, String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT key, value FROM app_settings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn upsert_setting(
        &self,
        key: &str,
        value: &str,
        updated_by: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO app_settings (key, value, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at,
                 updated_by = excluded.updated_by",
            params![key, value, ts(now), updated_by],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const GROUP: i64 = -1001;

    fn store() -> Store {
        Store::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn approval_is_idempotent() {
        let store = store();
        let now = Utc::now();
        assert!(!store.is_approved(GROUP, 1).unwrap());
        store.mark_approved(GROUP, 1, now).unwrap();
        store.mark_approved(GROUP, 1, now).unwrap();
        assert!(store.is_approved(GROUP, 1).unwrap());
    }

    #[test]
    fn upsert_session_creates_then_resets() {
        let store = store();
        let now = Utc::now();
        let remind = now + Duration::minutes(10);
        let expires = now + Duration::minutes(60);

        let first = store
            .upsert_session(GROUP, 5, "apricot", remind, expires, now)
            .unwrap();
        assert_eq!(first.state, SessionState::JoinedLocked);
        assert_eq!(first.reminder_count, 0);

        // A rejoin resets the word and timers but keeps the row identity.
        let later = now + Duration::minutes(5);
        let second = store
            .upsert_session(GROUP, 5, "walnut", remind, expires, later)
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.magic_word, "walnut");
        assert_eq!(second.state, SessionState::JoinedLocked);
    }

    #[test]
    fn upsert_session_keeps_confirmed_untouched() {
        let store = store();
        let now = Utc::now();
        let remind = now + Duration::minutes(10);
        let expires = now + Duration::minutes(60);
        let session = store
            .upsert_session(GROUP, 6, "apricot", remind, expires, now)
            .unwrap();
        store.confirm_session(session.id, 2, now).unwrap();

        let again = store
            .upsert_session(GROUP, 6, "walnut", remind, expires, now)
            .unwrap();
        assert_eq!(again.state, SessionState::ConfirmedUnlocked);
        assert_eq!(again.magic_word, "apricot");
    }

    #[test]
    fn confirm_parks_reminder_columns() {
        let store = store();
        let now = Utc::now();
        let remind = now + Duration::minutes(10);
        let expires = now + Duration::minutes(60);
        let session = store
            .upsert_session(GROUP, 7, "apricot", remind, expires, now)
            .unwrap();
        store.confirm_session(session.id, 2, now).unwrap();

        let confirmed = store.session_by_id(session.id).unwrap().unwrap();
        assert_eq!(confirmed.reminder_count, 2);
        assert_eq!(confirmed.remind_at, confirmed.expires_at);
        assert!(store
            .due_sessions(now + Duration::minutes(30), 2)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn due_sessions_filters_by_state_count_and_expiry() {
        let store = store();
        let now = Utc::now();
        let expires = now + Duration::minutes(60);

        // Due: remind_at in the past, unconfirmed, under the cap.
        let due = store
            .upsert_session(GROUP, 1, "apricot", now - Duration::minutes(1), expires, now)
            .unwrap();
        // Not due yet.
        store
            .upsert_session(GROUP, 2, "walnut", now + Duration::minutes(9), expires, now)
            .unwrap();
        // Expired.
        store
            .upsert_session(
                GROUP,
                3,
                "cherry",
                now - Duration::minutes(30),
                now - Duration::minutes(1),
                now,
            )
            .unwrap();

        let found = store.due_sessions(now, 2).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[test]
    fn reminder_updates_apply_atomically() {
        let store = store();
        let now = Utc::now();
        let expires = now + Duration::minutes(60);
        let a = store
            .upsert_session(GROUP, 1, "apricot", now - Duration::minutes(1), expires, now)
            .unwrap();
        let b = store
            .upsert_session(GROUP, 2, "walnut", now - Duration::minutes(1), expires, now)
            .unwrap();

        store
            .apply_reminder_updates(
                &[
                    ReminderUpdate {
                        id: a.id,
                        reminder_count: 1,
                        remind_at: now + Duration::minutes(10),
                    },
                    ReminderUpdate {
                        id: b.id,
                        reminder_count: 2,
                        remind_at: b.expires_at,
                    },
                ],
                now,
            )
            .unwrap();

        assert_eq!(store.session_by_id(a.id).unwrap().unwrap().reminder_count, 1);
        let b2 = store.session_by_id(b.id).unwrap().unwrap();
        assert_eq!(b2.reminder_count, 2);
        assert_eq!(b2.remind_at, b2.expires_at);
    }

    #[test]
    fn attach_welcome_skips_confirmed_sessions() {
        let store = store();
        let now = Utc::now();
        let session = store
            .upsert_session(GROUP, 9, "apricot", now, now + Duration::minutes(60), now)
            .unwrap();
        assert!(store.attach_welcome_message(session.id, 42, now).unwrap());
        store.confirm_session(session.id, 2, now).unwrap();
        assert!(!store.attach_welcome_message(session.id, 43, now).unwrap());
        let row = store.session_by_id(session.id).unwrap().unwrap();
        assert_eq!(row.welcome_message_id, Some(42));
    }

    #[test]
    fn profile_phone_survives_updates_without_contact() {
        let store = store();
        let now = Utc::now();
        store
            .upsert_profile(1, "Ada", None, Some("ada"), Some("+99890"), now)
            .unwrap();
        store
            .upsert_profile(1, "Ada", Some("Lovelace"), Some("ada"), None, now)
            .unwrap();
        let profile = store.profile(1).unwrap().unwrap();
        assert_eq!(profile.phone_number.as_deref(), Some("+99890"));
        assert_eq!(profile.last_name.as_deref(), Some("Lovelace"));
    }

    #[test]
    fn ai_stamp_enforces_cooldown() {
        let store = store();
        let now = Utc::now();
        store.upsert_profile(1, "Ada", None, None, None, now).unwrap();

        assert!(store.try_stamp_ai_check(1, now, 30).unwrap());
        // Second message 5s later is inside the cooldown.
        assert!(!store
            .try_stamp_ai_check(1, now + Duration::seconds(5), 30)
            .unwrap());
        // After the window it opens again.
        assert!(store
            .try_stamp_ai_check(1, now + Duration::seconds(31), 30)
            .unwrap());
    }

    #[test]
    fn ai_stamp_without_profile_claims_nothing() {
        let store = store();
        assert!(!store.try_stamp_ai_check(404, Utc::now(), 30).unwrap());
    }

    #[test]
    fn word_upsert_reenables_and_updates_display() {
        let store = store();
        let now = Utc::now();
        store
            .upsert_word("casino", "Casino", MatchKind::Token, 1, now)
            .unwrap();
        let id = store.word_by_norm("casino").unwrap().unwrap().id;
        store.set_word_enabled(id, false).unwrap();
        assert!(store.enabled_words().unwrap().is_empty());

        store
            .upsert_word("casino", "CASINO!", MatchKind::Token, 2, now)
            .unwrap();
        let row = store.word_by_norm("casino").unwrap().unwrap();
        assert!(row.enabled);
        assert_eq!(row.display(), "CASINO!");
        assert_eq!(row.id, id);
    }

    #[test]
    fn insert_ignore_reports_only_new_rows() {
        let store = store();
        let now = Utc::now();
        let rows = vec![
            ("casino".to_string(), "casino".to_string(), MatchKind::Token),
            (
                "free money".to_string(),
                "free money".to_string(),
                MatchKind::Phrase,
            ),
        ];
        assert_eq!(store.insert_words_ignore(&rows, 0, now).unwrap(), 2);
        assert_eq!(store.insert_words_ignore(&rows, 0, now).unwrap(), 0);
    }

    #[test]
    fn search_matches_substring_of_normalized_form() {
        let store = store();
        let now = Utc::now();
        store
            .upsert_word("1plusbet", "1+Bet", MatchKind::Token, 1, now)
            .unwrap();
        store
            .upsert_word("casino", "casino", MatchKind::Token, 1, now)
            .unwrap();
        let hits = store.search_words("plus", 50).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].word, "1plusbet");
    }

    #[test]
    fn settings_roundtrip() {
        let store = store();
        let now = Utc::now();
        store.upsert_setting("MUTE_MINUTES", "25", 1, now).unwrap();
        store.upsert_setting("MUTE_MINUTES", "30", 2, now).unwrap();
        let settings = store.load_settings().unwrap();
        assert_eq!(settings.get("MUTE_MINUTES").map(String::as_str), Some("30"));
    }

    #[test]
    fn moderation_event_appends() {
        let store = store();
        let event = NewModerationEvent {
            group_id: GROUP,
            user_id: 1,
            message_id: 99,
            action: crate::types::ModerationAction::Muted,
            reason_type: crate::types::ModerationReason::Keyword,
            matched_word: Some("casino".into()),
            ai_label: None,
            ai_confidence: None,
            ai_summary: None,
        };
        store.append_moderation_event(&event, Utc::now()).unwrap();
        store.append_moderation_event(&event, Utc::now()).unwrap();
        assert_eq!(store.count_moderation_events(GROUP, 1).unwrap(), 2);
    }
}
