//! Magic-word pool for the private-chat confirmation step.
//!
//! Short, common, unambiguous words: easy to type on a phone, hard to get
//! wrong. The verifier compares normalized forms, so case and stray
//! apostrophes do not matter.

pub const MAGIC_WORDS: &[&str] = &[
    "apricot", "walnut", "cherry", "melon", "quince", "almond", "raisin",
    "pepper", "saffron", "basil", "ginger", "sesame", "barley", "clover",
    "maple", "willow", "poplar", "cedar", "juniper", "acorn", "pebble",
    "meadow", "harbor", "lantern", "compass", "anchor", "beacon", "bridge",
    "castle", "garden", "meteor", "nebula", "comet", "aurora", "breeze",
    "thunder", "ember", "crystal", "marble", "copper", "silver", "cobalt",
    "indigo", "crimson", "amber", "velvet", "ribbon", "pocket",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_nonempty_and_lowercase() {
        assert!(!MAGIC_WORDS.is_empty());
        for word in MAGIC_WORDS {
            assert!(word.chars().all(|c| c.is_ascii_lowercase()), "{word}");
            assert!(word.len() >= 4, "{word}");
        }
    }

    #[test]
    fn pool_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for word in MAGIC_WORDS {
            assert!(seen.insert(word), "duplicate: {word}");
        }
    }
}
