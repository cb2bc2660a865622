//! Approximate string matching based on Levenshtein edit distance.
//!
//! Complexity is O(|a|·|b|) time and O(min(|a|, |b|)) memory per pair, which
//! is fine for the short fields it is used on (addresses, subjects, command
//! names).

use serde::Serialize;

/// Default similarity threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Fuzzy matching switches carried by a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzyConfig {
    pub enabled: bool,
    /// Minimum similarity in `[0, 1]`.
    pub threshold: f64,
    /// Case-sensitive matching also disables fuzzy comparison.
    pub case_sensitive: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            case_sensitive: false,
        }
    }
}

impl FuzzyConfig {
    /// Whether approximate comparison applies at all.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.case_sensitive
    }
}

/// Classic edit distance over Unicode scalar values, two rows at a time.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    // Keep the shorter string in the row.
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let cost = usize::from(lc != sc);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// `1 - distance / max(len)` on lower-cased input. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// `true` iff `similarity(a, b) >= threshold`.
pub fn similar(a: &str, b: &str, threshold: f64) -> bool {
    similarity(a, b) >= threshold
}

/// Whether `needle` approximately occurs in `haystack`.
///
/// Matches when the haystack contains the needle, when the whole haystack is
/// similar to it, or when any run of consecutive haystack words (as many as
/// the needle has) is similar to it. Inputs are compared lower-cased.
pub fn fuzzy_contains(haystack: &str, needle: &str, threshold: f64) -> bool {
    let hay = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    if needle.is_empty() || hay.contains(&needle) {
        return true;
    }
    if similar(&hay, &needle, threshold) {
        return true;
    }

    let width = needle.split_whitespace().count().max(1);
    let words: Vec<&str> = hay
        .split(|c: char| !c.is_alphanumeric() && c != '@' && c != '.' && c != '-' && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    words
        .windows(width.min(words.len()).max(1))
        .any(|window| similar(&window.join(" "), &needle, threshold))
}

/// Up to `max` candidates close to `input`, nearest first.
///
/// A candidate qualifies when its edit distance is at most
/// `min(len/2 + 1, 3, len)` where `len` is the input length. Ties keep
/// candidate order.
pub fn suggest<'a>(input: &str, candidates: &[&'a str], max: usize) -> Vec<&'a str> {
    let input = input.to_lowercase();
    let len = input.chars().count();
    let max_distance = (len / 2 + 1).min(3).min(len);

    let mut scored: Vec<(usize, &str)> = candidates
        .iter()
        .map(|c| (levenshtein(&input, &c.to_lowercase()), *c))
        .filter(|(d, _)| *d <= max_distance)
        .collect();
    scored.sort_by_key(|(d, _)| *d);
    scored.into_iter().take(max).map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn test_similarity_is_case_insensitive() {
        assert_eq!(similarity("HELLO", "hello"), 1.0);
        assert!((similarity("john", "jon") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_similar_threshold() {
        assert!(similar("invoice", "invoise", 0.7));
        assert!(!similar("invoice", "receipt", 0.7));
        assert!(similar("", "", 1.0));
    }

    #[test]
    fn test_fuzzy_contains_window() {
        assert!(fuzzy_contains("Urgent: server down", "urgnt", 0.7));
        assert!(fuzzy_contains("Quarterly budget review", "budget reviw", 0.7));
        assert!(!fuzzy_contains("Lunch on friday", "invoice", 0.7));
        assert!(fuzzy_contains("anything", "", 0.9));
    }

    #[test]
    fn test_suggest_commands() {
        let commands = ["search", "stats", "report", "unsubscribe", "ranges"];
        assert_eq!(suggest("serch", &commands, 3), vec!["search"]);
        assert_eq!(suggest("stat", &commands, 3)[0], "stats");
        assert!(suggest("zzzzzzzz", &commands, 3).is_empty());
    }

    #[test]
    fn test_config_activity() {
        let mut cfg = FuzzyConfig::default();
        assert!(cfg.is_active());
        cfg.case_sensitive = true;
        assert!(!cfg.is_active());
    }
}
