//! Canonical text form shared by stored lexicon words and incoming messages.
//!
//! Steps, in order: trim, optional case fold, rewrite `<digits>+` to
//! `<digits>plus`, strip apostrophe variants and bare `+`, then keep only
//! maximal ASCII-alphanumeric runs. Words join the runs with no separator
//! (`1+Bet` → `1plusbet`), free text and phrases keep single-space word
//! boundaries so phrase substring matching still sees them.

/// Apostrophe look-alikes stripped before tokenization.
const APOSTROPHES: &[char] = &['\'', '’', '‘', 'ʻ', 'ʼ', '`', '´', 'ˈ'];

/// Normalize a single lexicon word: alphanumeric runs concatenated.
pub fn normalize_word(input: &str, fold_case: bool) -> String {
    canonical(input, fold_case, "")
}

/// Normalize free text or a phrase: alphanumeric runs joined by one space.
pub fn normalize_text(input: &str, fold_case: bool) -> String {
    canonical(input, fold_case, " ")
}

/// Maximal ASCII-alphanumeric runs, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn canonical(input: &str, fold_case: bool, separator: &str) -> String {
    let trimmed = input.trim();
    let folded = if fold_case {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    };
    let rewritten = rewrite_digit_plus(&folded);
    let stripped: String = rewritten
        .chars()
        .filter(|c| *c != '+' && !APOSTROPHES.contains(c))
        .collect();
    tokenize(&stripped).join(separator)
}

/// Rewrite each `+` that directly follows a decimal digit into `plus`,
/// defeating spellings like `1+bet`.
fn rewrite_digit_plus(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut prev: Option<char> = None;
    for ch in input.chars() {
        if ch == '+' && prev.is_some_and(|p| p.is_ascii_digit()) {
            out.push_str("plus");
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_concatenates_runs() {
        assert_eq!(normalize_word("  Free   Money ", true), "freemoney");
    }

    #[test]
    fn text_keeps_word_boundaries() {
        assert_eq!(normalize_text("Come to CASINO!", true), "come to casino");
    }

    #[test]
    fn digit_plus_is_rewritten() {
        assert_eq!(normalize_word("1+Bet", true), "1plusbet");
        assert_eq!(normalize_text("play 1+bet now", true), "play 1plusbet now");
    }

    #[test]
    fn bare_plus_is_stripped() {
        assert_eq!(normalize_word("c+asino", true), "casino");
        assert_eq!(normalize_word("+promo", true), "promo");
    }

    #[test]
    fn double_plus_collapses() {
        // First + follows a digit and becomes "plus"; the second is bare.
        assert_eq!(normalize_word("1++bet", true), "1plusbet");
    }

    #[test]
    fn apostrophe_variants_collapse() {
        for apostrophe in ["'", "’", "‘", "ʻ", "ʼ", "`", "´", "ˈ"] {
            let word = format!("o{apostrophe}yin");
            assert_eq!(normalize_word(&word, true), "oyin", "{apostrophe}");
        }
    }

    #[test]
    fn case_fold_is_configurable() {
        assert_eq!(normalize_word("CaSiNo", true), "casino");
        assert_eq!(normalize_word("CaSiNo", false), "CaSiNo");
    }

    #[test]
    fn norm_is_idempotent() {
        for input in [
            "Come to CASINO!",
            "1+Bet  bonus",
            "o'yin   pul",
            "  spaced   out  ",
            "ALL+CAPS+99+",
        ] {
            let once = normalize_text(input, true);
            assert_eq!(normalize_text(&once, true), once, "{input}");
            let word_once = normalize_word(input, true);
            assert_eq!(normalize_word(&word_once, true), word_once, "{input}");
        }
    }

    #[test]
    fn non_ascii_letters_are_separators() {
        // Cyrillic letters are not ASCII-alphanumeric; only the ASCII runs
        // survive.
        assert_eq!(normalize_text("казино casino", true), "casino");
    }

    #[test]
    fn tokenize_returns_ordered_runs() {
        assert_eq!(tokenize("come to casino"), vec!["come", "to", "casino"]);
        assert_eq!(tokenize("a-b_c"), vec!["a", "b", "c"]);
        assert!(tokenize("  ...  ").is_empty());
    }
}
