//! Company name normalization
//!
//! Reduces a raw company name, page title or domain string to a canonical
//! comparison key:
//! - Trailing descriptive text after `|`, ` - `, `,` or `(` is dropped
//! - `-` and `&` become spaces, other punctuation is stripped
//! - Case and whitespace are normalized
//! - Legal-entity boilerplate (Ltd, LLC, Inc, ...) is removed as whole words
//! - Configured location qualifiers ("London", "UK", ...) are cut off
//!
//! The output is meant for comparison only, never for display.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Legal-entity tokens removed during normalization.
/// Also used as the stopword set for word-run scoring.
pub const LEGAL_SUFFIXES: &[&str] = &[
    "limited",
    "ltd",
    "llc",
    "inc",
    "pty",
    "pl",
    "co",
    "corp",
    "incorporated",
];

/// Separators after which a name is assumed to be descriptive noise.
const TRUNCATE_AT: &[&str] = &["|", " - ", ",", "("];

static LEGAL_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = LEGAL_SUFFIXES.join("|");
    Regex::new(&format!(r"\b(?:{})\b", alternatives)).expect("legal suffix regex is valid")
});

/// Normalizer carrying the caller-configured location tokens.
#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    /// One pattern per location token: the token and everything after it
    location_patterns: Vec<Regex>,
}

impl NameNormalizer {
    /// Create a normalizer with no location tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a normalizer from a comma-separated token list, e.g. `"london, uk"`.
    pub fn with_locations(ignore_in_company_name: &str) -> Self {
        let tokens: Vec<String> = ignore_in_company_name
            .split(',')
            .map(|t| collapse_whitespace(&t.to_lowercase()))
            .filter(|t| !t.is_empty())
            .collect();
        Self::with_location_tokens(&tokens)
    }

    /// Create a normalizer from already-split location tokens.
    pub fn with_location_tokens(tokens: &[String]) -> Self {
        let location_patterns = tokens
            .iter()
            .filter_map(|token| {
                let pattern = format!(r"\b{}\b.*$", regex::escape(token));
                match Regex::new(&pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        debug!("Ignoring location token '{}': {}", token, e);
                        None
                    }
                }
            })
            .collect();

        Self { location_patterns }
    }

    /// Canonical comparison form of `raw`.
    pub fn normalize(&self, raw: &str) -> String {
        // 1. Keep only the text before the first separator
        let mut cut = raw.len();
        for separator in TRUNCATE_AT {
            if let Some(index) = raw.find(separator) {
                cut = cut.min(index);
            }
        }
        let head = &raw[..cut];

        // 2-3. Dashes and ampersands separate words; everything else non-alphanumeric goes
        let spaced = head.replace(['-', '&'], " ");
        let stripped: String = spaced
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
            .collect();

        // 4. Lower-case and collapse whitespace
        let mut result = collapse_whitespace(&stripped.to_lowercase());

        // 5. Legal-entity boilerplate as whole words only
        result = LEGAL_SUFFIX_RE.replace_all(&result, " ").into_owned();
        result = collapse_whitespace(&result);

        // 6. Location qualifiers cut the rest of the name
        for pattern in &self.location_patterns {
            result = pattern.replace(&result, "").into_owned();
        }

        // 7.
        collapse_whitespace(&result)
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Lower-cased letters and digits only: the form used for no-space comparisons.
pub fn letters_and_digits(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boilerplate_stripping() {
        let n = NameNormalizer::new();
        assert_eq!(n.normalize("Acme Trading Ltd."), n.normalize("Acme Trading"));
        assert_eq!(n.normalize("Acme Trading Ltd."), "acme trading");
        assert_eq!(n.normalize("ACME WIDGETS LIMITED"), "acme widgets");
        assert_eq!(n.normalize("Globex Corp Inc"), "globex");
    }

    #[test]
    fn test_legal_suffix_requires_word_boundary() {
        let n = NameNormalizer::new();
        assert_eq!(n.normalize("Cobalt Incense Ltd"), "cobalt incense");
        assert_eq!(n.normalize("Plinth Co"), "plinth");
        assert_eq!(n.normalize("Pty Ltd Holdings"), "holdings");
    }

    #[test]
    fn test_truncates_at_first_separator() {
        let n = NameNormalizer::new();
        assert_eq!(n.normalize("Heaven Scent | Handmade Incense"), "heaven scent");
        assert_eq!(n.normalize("Acme Widgets - Home"), "acme widgets");
        assert_eq!(n.normalize("Acme Widgets, Bath"), "acme widgets");
        assert_eq!(n.normalize("Acme (UK) Ltd"), "acme");
        // a hyphen without surrounding spaces is a word break, not a separator
        assert_eq!(n.normalize("Rolls-Royce"), "rolls royce");
    }

    #[test]
    fn test_ampersand_and_punctuation() {
        let n = NameNormalizer::new();
        assert_eq!(n.normalize("Marks & Spencer"), "marks spencer");
        assert_eq!(n.normalize("O'Reilly  Media!"), "oreilly media");
    }

    #[test]
    fn test_location_tokens_cut_rest_of_name() {
        let n = NameNormalizer::with_locations("london, uk");
        assert_eq!(n.normalize("Acme London Holdings Ltd"), "acme");
        assert_eq!(n.normalize("Acme Widgets UK"), "acme widgets");
        // not inside other words
        assert_eq!(n.normalize("Londoner Pies"), "londoner pies");
        assert_eq!(n.normalize("Bukhara Rugs"), "bukhara rugs");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = NameNormalizer::with_locations("london,bath");
        let inputs = [
            "Acme Trading Ltd.",
            "Heaven Scent Incense | Bath",
            "  The  Co-operative  &  Co  ",
            "Ltd Ltd Ltd",
            "acmewidgets.com",
            "London Fog Ltd (Bath)",
            "",
            "(leading paren) name",
        ];
        for input in inputs {
            let once = n.normalize(input);
            assert_eq!(n.normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_letters_and_digits() {
        assert_eq!(letters_and_digits("Acme Ltd"), "acmeltd");
        assert_eq!(letters_and_digits("heavenscent.com"), "heavenscentcom");
        assert_eq!(letters_and_digits("  "), "");
    }
}
