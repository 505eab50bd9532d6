//! One-time lexicon seeding from a word file.
//!
//! Runs at startup only when the table is empty, so admin edits are never
//! clobbered by a redeploy. Two file shapes are accepted: JSON
//! `{"words": [...]}` (by `.json` extension) and newline-delimited text with
//! `#` comment lines.

use std::path::Path;

use chrono::Utc;
use gatewarden_store::{MatchKind, Store};
use tracing::{info, warn};

use crate::error::{LexiconError, Result};
use crate::normalize::normalize_word;

/// Entries whose normal form is shorter than this are dropped at seed time.
const MIN_SEED_LEN: usize = 3;

/// Seed the lexicon from `path` if the table is empty. Returns how many
/// entries were inserted (0 when the table already has rows or the file is
/// absent).
pub fn seed_from_file_if_empty(
    store: &Store,
    path: Option<&str>,
    fold_case: bool,
    created_by: i64,
) -> Result<usize> {
    if !store.lexicon_is_empty()? {
        return Ok(0);
    }
    let Some(path) = path else {
        return Ok(0);
    };
    let file = Path::new(path);
    if !file.exists() {
        warn!(%path, "prohibited-words file not found, skipping seed");
        return Ok(0);
    }

    let raw = std::fs::read_to_string(file)?;
    let words = if file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    {
        parse_words_json(&raw)?
    } else {
        parse_words_lines(&raw)
    };

    let mut rows = Vec::new();
    for original in words {
        // Phrases keep a single space between their parts so the matcher
        // treats them as multi-word entries.
        let (stored, kind) = classify(&original, fold_case);
        if normalize_word(&original, fold_case).len() < MIN_SEED_LEN {
            continue;
        }
        rows.push((stored, original, kind));
    }

    let inserted = store.insert_words_ignore(&rows, created_by, Utc::now())?;
    if inserted > 0 {
        info!(count = inserted, %path, "seeded prohibited words from file");
    }
    Ok(inserted)
}

/// Normalized stored form plus the matching kind for a raw admin/file entry.
///
/// `PHRASE` iff the normalized text still contains inner whitespace.
pub fn classify(raw: &str, fold_case: bool) -> (String, MatchKind) {
    let text = crate::normalize::normalize_text(raw, fold_case);
    if text.contains(' ') {
        (text, MatchKind::Phrase)
    } else {
        (text, MatchKind::Token)
    }
}

/// Parse the JSON shape: `{"words": ["a", "b", ...]}`.
pub fn parse_words_json(raw: &str) -> Result<Vec<String>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| LexiconError::Parse(e.to_string()))?;
    let items = value
        .get("words")
        .and_then(|w| w.as_array())
        .ok_or_else(|| LexiconError::Parse("'words' must be a list".to_string()))?;
    Ok(items
        .iter()
        .filter_map(|item| item.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Parse newline-delimited words; blank lines and `#` comments are skipped.
pub fn parse_words_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn json_shape_parses() {
        let words = parse_words_json(r#"{"words": [" casino ", "1+bet", ""]}"#).unwrap();
        assert_eq!(words, vec!["casino", "1+bet"]);
    }

    #[test]
    fn json_without_words_list_is_rejected() {
        assert!(parse_words_json(r#"{"words": "casino"}"#).is_err());
        assert!(parse_words_json("[]").is_err());
    }

    #[test]
    fn line_shape_skips_comments_and_blanks() {
        let words = parse_words_lines("# header\ncasino\n\n  free money  \n#tail\n");
        assert_eq!(words, vec!["casino", "free money"]);
    }

    #[test]
    fn classify_detects_phrases() {
        assert_eq!(classify("Free  Money", true), ("free money".to_string(), MatchKind::Phrase));
        assert_eq!(classify("1+Bet", true), ("1plusbet".to_string(), MatchKind::Token));
    }

    #[test]
    fn seed_skips_nonempty_table_and_short_words() {
        let store = Store::new(Connection::open_in_memory().unwrap()).unwrap();

        // No path configured → nothing to do.
        assert_eq!(seed_from_file_if_empty(&store, None, true, 0).unwrap(), 0);

        let dir = std::env::temp_dir().join("gatewarden-seed-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("words.txt");
        std::fs::write(&path, "casino\nab\n# note\nfree money\n").unwrap();

        let inserted =
            seed_from_file_if_empty(&store, Some(path.to_str().unwrap()), true, 0).unwrap();
        // "ab" falls under the 3-char minimum.
        assert_eq!(inserted, 2);
        assert!(store.word_by_norm("casino").unwrap().is_some());
        assert!(store.word_by_norm("free money").unwrap().is_some());
        assert!(store.word_by_norm("ab").unwrap().is_none());

        // Second run is a no-op: the table now has rows.
        let again =
            seed_from_file_if_empty(&store, Some(path.to_str().unwrap()), true, 0).unwrap();
        assert_eq!(again, 0);
    }
}
