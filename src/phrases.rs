//! Seed phrases and the lexical matcher built from them.
//!
//! The same phrase list serves two purposes: it is compiled into one
//! case-insensitive pattern for lexical matching, and it is embedded by each
//! scoring worker as the semantic reference set.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical privacy-related phrases.
pub const SEED_PHRASES: &[&str] = &[
    "privacy policy",
    "privacy notice",
    "privacy statement",
    "privacy center",
    "privacy & terms",
    "privacy & cookies notice",
];

static PHRASE_MATCHER: Lazy<Regex> = Lazy::new(|| {
    let alternatives: Vec<String> = SEED_PHRASES.iter().map(|p| phrase_pattern(p)).collect();
    Regex::new(&format!("(?i){}", alternatives.join("|")))
        .expect("BUG: seed phrase pattern is invalid")
});

/// Turns a phrase into a pattern where every run of non-word characters
/// matches any (possibly empty) run of non-word characters.
fn phrase_pattern(phrase: &str) -> String {
    phrase
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\W*")
}

/// Returns true if `text` contains any seed phrase.
pub fn matches(text: &str) -> bool {
    PHRASE_MATCHER.is_match(text)
}
