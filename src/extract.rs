//! Turn information extraction
//!
//! Scans one user/assistant exchange for structured facts (contact info,
//! dates, times, URLs, honorific names) and for sentences flagged by
//! importance keywords. Extraction is pure text work: deterministic,
//! order-preserving, no deduplication, no external calls.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

/// Extraction output: category name to matches in order of appearance
pub type ExtractedInfo = BTreeMap<String, Vec<String>>;

/// Category key for keyword-flagged sentences
pub const IMPORTANT_POINTS: &str = "important_points";

/// The default pattern set, compiled once
static DEFAULT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "email",
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        ),
        (
            "phone",
            r"\b(\+\d{1,2}\s?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
        ),
        (
            "date",
            r"\b(0?[1-9]|1[0-2])[/\-](0?[1-9]|[12]\d|3[01])[/\-](19|20)?\d{2}\b",
        ),
        (
            "time",
            r"\b([01]?[0-9]|2[0-3]):([0-5][0-9])(:[0-5][0-9])?\s*([ap]m|[AP]M)?\b",
        ),
        (
            "url",
            r"https?://(?:[-\w.]|(?:%[\da-fA-F]{2}))+[/\w.-]*\??[/\w.\-=&%]*",
        ),
        (
            "name",
            r"(?:Mr\.|Mrs\.|Ms\.|Dr\.|Prof\.)\s[A-Z][a-z]+(?:\s[A-Z][a-z]+)*",
        ),
    ]
    .into_iter()
    .map(|(category, pattern)| (category, Regex::new(pattern).expect("valid regex")))
    .collect()
});

/// Keywords that flag a sentence as an important point
const IMPORTANT_KEYWORDS: &[&str] = &[
    "appointment",
    "schedule",
    "meeting",
    "remember",
    "important",
    "deadline",
    "contact",
    "follow up",
    "call back",
    "priority",
    "urgent",
    "critical",
    "key point",
    "action item",
];

/// Pattern and keyword configuration for the extractor
///
/// The default set covers the six structured categories plus the
/// importance keywords; alternates can be supplied since the patterns are
/// tuned heuristics, not invariants.
pub struct ExtractionConfig {
    patterns: Vec<(String, Regex)>,
    keywords: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS
                .iter()
                .map(|(c, r)| ((*c).to_string(), r.clone()))
                .collect(),
            keywords: IMPORTANT_KEYWORDS.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

impl ExtractionConfig {
    /// Build a config from custom category/pattern pairs and keywords
    ///
    /// # Errors
    ///
    /// Returns error if any pattern fails to compile
    pub fn new(patterns: &[(&str, &str)], keywords: &[&str]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|(category, pattern)| {
                Regex::new(pattern)
                    .map(|re| ((*category).to_string(), re))
                    .map_err(|e| Error::Config(format!("bad pattern for {category}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        })
    }

    /// Configured category names, in scan order
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        self.patterns.iter().map(|(c, _)| c.as_str()).collect()
    }
}

/// Extracts structured facts from a conversational turn
pub struct TurnExtractor {
    config: ExtractionConfig,
}

impl TurnExtractor {
    /// Create an extractor with the given configuration
    #[must_use]
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Scan a user/assistant text pair
    ///
    /// The two texts are concatenated with role labels and scanned once
    /// per category; non-overlapping matches are kept in order of
    /// appearance, duplicates included. Sentences containing an
    /// importance keyword (case-insensitive) land under
    /// [`IMPORTANT_POINTS`]. Categories with no hits are omitted.
    #[must_use]
    pub fn extract(&self, user_text: &str, assistant_text: &str) -> ExtractedInfo {
        let combined = format!("User: {user_text}\nAssistant: {assistant_text}");
        let mut extracted = ExtractedInfo::new();

        for (category, pattern) in &self.config.patterns {
            let matches: Vec<String> = pattern
                .find_iter(&combined)
                .map(|m| m.as_str().to_string())
                .collect();
            if !matches.is_empty() {
                extracted.insert(category.clone(), matches);
            }
        }

        let important: Vec<String> = split_sentences(&combined)
            .into_iter()
            .filter(|sentence| {
                let lower = sentence.to_lowercase();
                self.config.keywords.iter().any(|k| lower.contains(k))
            })
            .map(|s| s.trim().to_string())
            .collect();
        if !important.is_empty() {
            extracted.insert(IMPORTANT_POINTS.to_string(), important);
        }

        extracted
    }
}

impl Default for TurnExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

/// Split text into sentences on terminal punctuation followed by whitespace
///
/// The terminator stays with its sentence. A trailing fragment without
/// terminal punctuation is still a sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    sentences.push(&text[start..=i]);
                    start = next_i;
                }
            }
        }
    }

    if start < text.len() {
        let tail = &text[start..];
        if !tail.trim().is_empty() {
            sentences.push(tail);
        }
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("First one. Second one! Third?");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0], "First one.");
        assert_eq!(sentences[1].trim(), "Second one!");
        assert_eq!(sentences[2].trim(), "Third?");
    }

    #[test]
    fn decimal_points_do_not_split() {
        let sentences = split_sentences("The price is 3.50 total. Thanks.");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "The price is 3.50 total.");
    }

    #[test]
    fn phone_category_matches_whole_number() {
        let extractor = TurnExtractor::default();
        let info = extractor.extract("Call me at 555-123-4567", "Sure, noted.");

        assert_eq!(info.get("phone").map(Vec::as_slice), Some(&["555-123-4567".to_string()][..]));
        assert_eq!(info.len(), 1, "no other categories expected: {info:?}");
    }

    #[test]
    fn email_and_url_extracted_in_order() {
        let extractor = TurnExtractor::default();
        let info = extractor.extract(
            "Email me at a@example.com or b@example.org, docs at https://example.com/docs",
            "Will do.",
        );

        assert_eq!(
            info["email"],
            vec!["a@example.com".to_string(), "b@example.org".to_string()]
        );
        assert_eq!(info["url"], vec!["https://example.com/docs".to_string()]);
    }

    #[test]
    fn honorific_names_matched() {
        let extractor = TurnExtractor::default();
        let info = extractor.extract("I spoke with Dr. Jane Smith yesterday", "Noted.");
        assert_eq!(info["name"], vec!["Dr. Jane Smith".to_string()]);
    }

    #[test]
    fn important_sentences_flagged_case_insensitively() {
        let extractor = TurnExtractor::default();
        let info = extractor.extract(
            "We have a MEETING tomorrow. The weather is nice.",
            "I'll remember that.",
        );

        let points = &info[IMPORTANT_POINTS];
        assert_eq!(points.len(), 2);
        assert!(points[0].contains("MEETING"));
        assert!(points[1].contains("remember"));
    }

    #[test]
    fn duplicates_kept_at_extraction_time() {
        let extractor = TurnExtractor::default();
        let info = extractor.extract("555-123-4567 and again 555-123-4567", "Ok.");
        assert_eq!(info["phone"].len(), 2);
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = TurnExtractor::default();
        let a = extractor.extract("Meet Dr. Lee at 10:30 am on 5/12/2025", "Scheduled.");
        let b = extractor.extract("Meet Dr. Lee at 10:30 am on 5/12/2025", "Scheduled.");
        assert_eq!(a, b);
    }

    #[test]
    fn no_hits_returns_empty_mapping() {
        let extractor = TurnExtractor::default();
        let info = extractor.extract("Hello there", "Hi!");
        assert!(info.is_empty());
    }

    #[test]
    fn custom_patterns_compile() {
        let config =
            ExtractionConfig::new(&[("ticket", r"\bTKT-\d+\b")], &["escalate"]).unwrap();
        let extractor = TurnExtractor::new(config);
        let info = extractor.extract("Please escalate TKT-42.", "On it.");
        assert_eq!(info["ticket"], vec!["TKT-42".to_string()]);
        assert_eq!(info[IMPORTANT_POINTS].len(), 1);
    }

    #[test]
    fn bad_custom_pattern_is_an_error() {
        assert!(ExtractionConfig::new(&[("broken", "(")], &[]).is_err());
    }
}
