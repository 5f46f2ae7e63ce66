//! String similarity between company names and domains/titles
//!
//! Two heuristics, both returning a value in `0.0..=1.0`:
//! - word run: longest run of the name's words, anchored at its start or end,
//!   that occurs in the text
//! - char run: longest prefix of the name (letters/digits only) that occurs in
//!   the text (letters/digits only), relative to the text's length
//!
//! Identical letters/digits forms always score 1.

use std::fmt;

use crate::domain_utils::{domain_stem, looks_like_domain};
use crate::name_normalizer::{letters_and_digits, LEGAL_SUFFIXES};

/// Which heuristic to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimilarityMode {
    /// Space-preserving comparison
    WordRun,
    /// No-space comparison (names compressed into a domain)
    CharRun,
}

impl SimilarityMode {
    pub const ALL: [SimilarityMode; 2] = [SimilarityMode::WordRun, SimilarityMode::CharRun];
}

impl fmt::Display for SimilarityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMode::WordRun => write!(f, "word run"),
            SimilarityMode::CharRun => write!(f, "char run"),
        }
    }
}

/// Score `name` against `text` with the given heuristic.
pub fn score(mode: SimilarityMode, name: &str, text: &str) -> f64 {
    match mode {
        SimilarityMode::WordRun => score_word_run(name, text),
        SimilarityMode::CharRun => score_char_run(name, text),
    }
}

/// Fraction of `name`'s words covered by the longest start- or end-anchored
/// run that appears in `text`.
pub fn score_word_run(name: &str, text: &str) -> f64 {
    if is_exact_match(name, text) {
        return 1.0;
    }

    let lowered = name.to_lowercase();
    let words: Vec<&str> = lowered
        .split_whitespace()
        .filter(|w| !LEGAL_SUFFIXES.contains(w))
        .collect();
    if words.is_empty() {
        return 0.0;
    }

    let haystack = text.to_lowercase();
    let total = words.len();

    // Longest runs first; the first hit is the answer
    for length in (1..=total).rev() {
        let from_start = words[..length].join(" ");
        let from_end = words[total - length..].join(" ");
        if haystack.contains(&from_start) || haystack.contains(&from_end) {
            return length as f64 / total as f64;
        }
    }

    0.0
}

/// Length of the longest prefix of `name` found in `text`, over `text`'s length,
/// both reduced to letters and digits.
pub fn score_char_run(name: &str, text: &str) -> f64 {
    if is_exact_match(name, text) {
        return 1.0;
    }

    let name = letters_and_digits(name);
    let text = letters_and_digits(text);
    if name.is_empty() || text.is_empty() {
        return 0.0;
    }

    // ASCII only after reduction, so byte slicing is safe
    let mut longest = 0;
    for end in (1..=name.len()).rev() {
        if text.contains(&name[..end]) {
            longest = end;
            break;
        }
    }

    (longest as f64 / text.len() as f64).min(1.0)
}

/// Exact-match short-circuit on letters/digits forms. A bare domain is
/// compared through its stem so `acmeltd.com` equals "Acme Ltd".
pub fn is_exact_match(name: &str, text: &str) -> bool {
    let name_key = comparison_key(name);
    !name_key.is_empty() && name_key == comparison_key(text)
}

fn comparison_key(text: &str) -> String {
    if looks_like_domain(text) {
        letters_and_digits(domain_stem(text.trim()))
    } else {
        letters_and_digits(text)
    }
}
