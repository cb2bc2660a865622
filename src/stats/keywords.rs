//! Subject keyword extraction for the keyword frequency table.

/// Minimum keyword length in characters.
pub const MIN_KEYWORD_LEN: usize = 3;

/// Words never counted as keywords: articles, prepositions, pronouns,
/// auxiliaries and reply/forward markers.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "fw", "fwd", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "more", "most", "my",
    "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours",
    "out", "over", "own", "re", "same", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "theirs", "them", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your",
    "yours",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Lower-cased keywords of a subject line, in order of appearance.
///
/// Tokens are split on anything that is not alphanumeric or an apostrophe;
/// short tokens, pure numbers and stop words are dropped.
pub fn extract(subject: &str) -> impl Iterator<Item = String> + '_ {
    subject
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !is_stop_word(w))
}
