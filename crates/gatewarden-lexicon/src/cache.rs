//! In-memory index over the enabled prohibited words.
//!
//! `refresh` builds a complete new snapshot and publishes it with a single
//! swap; a reader clones the current `Arc` once per match and never observes
//! a half-rebuilt index.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use gatewarden_store::{MatchKind, Store};
use tracing::info;

use crate::error::Result;
use crate::normalize::{normalize_text, normalize_word, tokenize};

/// One matchable lexicon entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    /// Normalized form used for matching.
    pub word: String,
    /// What the admin typed — used in notifications and audit records.
    pub display: String,
    pub match_kind: MatchKind,
}

#[derive(Default)]
struct LexiconSnapshot {
    tokens: HashMap<String, LexiconEntry>,
    phrases: Vec<LexiconEntry>,
}

pub struct LexiconCache {
    fold_case: bool,
    snapshot: RwLock<Arc<LexiconSnapshot>>,
}

impl LexiconCache {
    /// Empty cache; call [`refresh`](Self::refresh) before first use.
    pub fn new(fold_case: bool) -> Self {
        Self {
            fold_case,
            snapshot: RwLock::new(Arc::new(LexiconSnapshot::default())),
        }
    }

    /// Rebuild both indexes from the store and swap them in atomically.
    /// Returns `(token_count, phrase_count)`.
    pub fn refresh(&self, store: &Store) -> Result<(usize, usize)> {
        let rows = store.enabled_words()?;

        let mut tokens = HashMap::new();
        let mut phrases = Vec::new();
        for row in rows {
            let display = row.display().to_string();
            match row.match_kind {
                MatchKind::Phrase => phrases.push(LexiconEntry {
                    word: normalize_text(&row.word, self.fold_case),
                    display,
                    match_kind: MatchKind::Phrase,
                }),
                MatchKind::Token => {
                    let norm = normalize_word(&row.word, self.fold_case);
                    tokens.insert(
                        norm.clone(),
                        LexiconEntry {
                            word: norm,
                            display,
                            match_kind: MatchKind::Token,
                        },
                    );
                }
            }
        }

        let counts = (tokens.len(), phrases.len());
        *self.snapshot.write().unwrap() = Arc::new(LexiconSnapshot { tokens, phrases });
        info!(tokens = counts.0, phrases = counts.1, "lexicon cache refreshed");
        Ok(counts)
    }

    /// First matching enabled entry, or `None`.
    ///
    /// Token lookup first (any hit suffices, order irrelevant), then phrase
    /// substring scan over the space-normalized text in stored order.
    pub fn match_text(&self, text: &str) -> Option<LexiconEntry> {
        if text.is_empty() {
            return None;
        }
        let snapshot = self.snapshot.read().unwrap().clone();
        let cleaned = normalize_text(text, self.fold_case);

        let mut seen = HashSet::new();
        for token in tokenize(&cleaned) {
            if !seen.insert(token.clone()) {
                continue;
            }
            if let Some(entry) = snapshot.tokens.get(&token) {
                return Some(entry.clone());
            }
        }

        snapshot
            .phrases
            .iter()
            .find(|entry| !entry.word.is_empty() && cleaned.contains(&entry.word))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rusqlite::Connection;

    fn seeded_store() -> Store {
        let store = Store::new(Connection::open_in_memory().unwrap()).unwrap();
        let now = Utc::now();
        store
            .upsert_word("casino", "CASINO", MatchKind::Token, 1, now)
            .unwrap();
        store
            .upsert_word("1plusbet", "1+Bet", MatchKind::Token, 1, now)
            .unwrap();
        store
            .upsert_word("free money", "free money", MatchKind::Phrase, 1, now)
            .unwrap();
        store
    }

    fn cache(store: &Store) -> LexiconCache {
        let cache = LexiconCache::new(true);
        cache.refresh(store).unwrap();
        cache
    }

    #[test]
    fn token_hit_through_normalization() {
        let store = seeded_store();
        let cache = cache(&store);
        let hit = cache.match_text("Come to CASINO!").unwrap();
        assert_eq!(hit.word, "casino");
        assert_eq!(hit.display, "CASINO");
    }

    #[test]
    fn digit_plus_evasion_is_caught() {
        let store = seeded_store();
        let cache = cache(&store);
        let hit = cache.match_text("try 1+bet today").unwrap();
        assert_eq!(hit.display, "1+Bet");
    }

    #[test]
    fn phrase_matches_as_substring_of_normalized_text() {
        let store = seeded_store();
        let cache = cache(&store);
        let hit = cache.match_text("get FREE   money now").unwrap();
        assert_eq!(hit.match_kind, MatchKind::Phrase);
        // Reordered words do not match a phrase.
        assert!(cache.match_text("money that is free").is_none());
    }

    #[test]
    fn clean_text_matches_nothing() {
        let store = seeded_store();
        let cache = cache(&store);
        assert!(cache.match_text("hello there, how are you?").is_none());
        assert!(cache.match_text("").is_none());
    }

    #[test]
    fn disabled_entry_is_never_returned() {
        let store = seeded_store();
        let cache = cache(&store);
        let id = store.word_by_norm("casino").unwrap().unwrap().id;
        store.set_word_enabled(id, false).unwrap();
        cache.refresh(&store).unwrap();
        assert!(cache.match_text("casino").is_none());
        // Other entries stay live.
        assert!(cache.match_text("free money").is_some());
    }

    #[test]
    fn refresh_reports_counts() {
        let store = seeded_store();
        let cache = LexiconCache::new(true);
        assert_eq!(cache.refresh(&store).unwrap(), (2, 1));
    }

    #[test]
    fn empty_cache_matches_nothing() {
        let cache = LexiconCache::new(true);
        assert!(cache.match_text("casino").is_none());
    }
}
