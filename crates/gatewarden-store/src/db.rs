use rusqlite::Connection;

use crate::error::Result;

/// Initialise all Gatewarden tables and indexes.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout. The
/// `UNIQUE(group_id, user_id)` constraints on members and sessions are the
/// storage-level guarantee the verification flow relies on; application code
/// never re-checks them.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS approved_members (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id    INTEGER NOT NULL,
            user_id     INTEGER NOT NULL,
            approved_at TEXT NOT NULL,
            UNIQUE(group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS verification_sessions (
            id                 TEXT PRIMARY KEY,
            group_id           INTEGER NOT NULL,
            user_id            INTEGER NOT NULL,
            state              TEXT NOT NULL,
            magic_word         TEXT NOT NULL,
            welcome_message_id INTEGER,
            reminder_count     INTEGER NOT NULL DEFAULT 0,
            remind_at          TEXT NOT NULL,
            expires_at         TEXT NOT NULL,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            UNIQUE(group_id, user_id)
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_state
            ON verification_sessions(state);
        CREATE INDEX IF NOT EXISTS idx_sessions_remind
            ON verification_sessions(remind_at);

        CREATE TABLE IF NOT EXISTS user_profiles (
            user_id            INTEGER PRIMARY KEY,
            first_name         TEXT NOT NULL,
            last_name          TEXT,
            username           TEXT,
            phone_number       TEXT,
            last_ai_check_at   TEXT,
            last_moderation_at TEXT,
            updated_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS prohibited_words (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            word       TEXT NOT NULL UNIQUE,
            original   TEXT,
            enabled    INTEGER NOT NULL DEFAULT 1,
            match_kind TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_by INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS moderation_events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id      INTEGER NOT NULL,
            user_id       INTEGER NOT NULL,
            message_id    INTEGER NOT NULL,
            action        TEXT NOT NULL DEFAULT 'NONE',
            reason_type   TEXT NOT NULL,
            matched_word  TEXT,
            ai_label      TEXT,
            ai_confidence REAL,
            ai_summary    TEXT,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_settings (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by INTEGER NOT NULL
        );",
    )?;
    Ok(())
}
