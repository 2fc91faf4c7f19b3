//! Comment normalization and deduplication.
//!
//! Cleans raw strings, fixes common chat spellings, collapses near-duplicates
//! (differing only by case or whitespace) and drops comments that are too
//! short or carry no letters. Pure and infallible.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::{Comment, RawComment};

// Compile patterns once at startup
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex: whitespace pattern"));
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Cc}\p{Cf}]").expect("Invalid regex: control characters"));
static REPEATED_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([!?.,])[!?.,]+").expect("Invalid regex: repeated punctuation"));

/// Whole-word spelling fixes, matched after lowercasing.
const CORRECTIONS: &[(&str, &str)] = &[
    ("q", "que"),
    ("xq", "porque"),
    ("pq", "porque"),
    ("porq", "porque"),
    ("tmb", "también"),
    ("tb", "también"),
    ("x", "por"),
    ("d", "de"),
    ("k", "que"),
    ("pesimo", "pésimo"),
    ("pesima", "pésima"),
    ("atencion", "atención"),
    ("conexion", "conexión"),
    ("senal", "señal"),
    ("rapido", "rápido"),
    ("facil", "fácil"),
    ("tambien", "también"),
    ("pls", "please"),
    ("thx", "thanks"),
    ("srvc", "service"),
];

/// Why a raw comment did not make it into the analysis set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NotText,
    Empty,
    NoLetters,
    TooShort,
}

/// Outcome of normalizing one batch of raw input.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub comments: Vec<Comment>,
    pub received: usize,
    pub rejected: HashMap<RejectReason, usize>,
}

impl NormalizedBatch {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    /// Raw comments represented by the kept entries, duplicates included.
    pub fn kept_total(&self) -> usize {
        self.comments.iter().map(|c| c.frequency).sum()
    }
}

/// Stateless text cleaner.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    min_words: usize,
    corrections: HashMap<&'static str, &'static str>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl TextNormalizer {
    pub fn new(min_words: usize) -> Self {
        Self {
            min_words: min_words.max(1),
            corrections: CORRECTIONS.iter().copied().collect(),
        }
    }

    /// Cleans a single string: strips control characters, collapses
    /// whitespace and repeated punctuation, lowercases and applies the
    /// spelling table.
    pub fn clean(&self, raw: &str) -> String {
        let text = CONTROL_CHARS.replace_all(raw, " ");
        let text = REPEATED_PUNCTUATION.replace_all(&text, "$1");
        let text = WHITESPACE.replace_all(text.trim(), " ");
        let lower = text.to_lowercase();

        lower
            .split(' ')
            .map(|word| self.correct_word(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn correct_word(&self, word: &str) -> String {
        let start = word.find(|c: char| c.is_alphanumeric());
        let end = word.rfind(|c: char| c.is_alphanumeric());
        let (Some(start), Some(end)) = (start, end) else {
            return word.to_string();
        };
        let end = end + word[end..].chars().next().map(char::len_utf8).unwrap_or(1);
        let core = &word[start..end];
        match self.corrections.get(core) {
            Some(fixed) => format!("{}{}{}", &word[..start], fixed, &word[end..]),
            None => word.to_string(),
        }
    }

    fn classify(&self, cleaned: &str) -> Result<(), RejectReason> {
        if cleaned.is_empty() {
            return Err(RejectReason::Empty);
        }
        if !cleaned.chars().any(char::is_alphabetic) {
            return Err(RejectReason::NoLetters);
        }
        let words = cleaned
            .split_whitespace()
            .filter(|w| w.chars().any(char::is_alphanumeric))
            .count();
        if words < self.min_words {
            return Err(RejectReason::TooShort);
        }
        Ok(())
    }

    /// Normalizes and deduplicates raw comments.
    ///
    /// The first occurrence of a duplicate keeps its raw text and metadata;
    /// later ones only bump its `frequency`. Output order follows first
    /// occurrence.
    pub fn normalize(&self, raw: &[RawComment]) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            received: raw.len(),
            ..Default::default()
        };
        let mut index: HashMap<String, usize> = HashMap::new();

        for item in raw {
            let Some(text) = item.text.as_str() else {
                *batch.rejected.entry(RejectReason::NotText).or_insert(0) += 1;
                continue;
            };

            let cleaned = self.clean(text);
            if let Err(reason) = self.classify(&cleaned) {
                *batch.rejected.entry(reason).or_insert(0) += 1;
                continue;
            }

            if let Some(&position) = index.get(&cleaned) {
                batch.comments[position].frequency += 1;
                continue;
            }

            let id = batch.comments.len();
            index.insert(cleaned.clone(), id);
            batch.comments.push(Comment {
                id,
                raw_text: WHITESPACE.replace_all(text.trim(), " ").into_owned(),
                normalized_text: cleaned,
                frequency: 1,
                metadata: item.metadata.clone(),
            });
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_collapses_whitespace_and_case() {
        let normalizer = TextNormalizer::default();
        assert_eq!(
            normalizer.clean("  El   Internet\tes\nLENTO!!!  "),
            "el internet es lento!"
        );
    }

    #[test]
    fn test_spelling_corrections() {
        let normalizer = TextNormalizer::default();
        assert_eq!(
            normalizer.clean("no funciona xq la senal es pesima"),
            "no funciona porque la señal es pésima"
        );
        // Punctuation around a corrected word survives.
        assert_eq!(normalizer.clean("(xq)"), "(porque)");
    }

    #[test]
    fn test_near_duplicates_collapse() {
        let normalizer = TextNormalizer::default();
        let raw = vec![
            RawComment::new("El servicio es malo"),
            RawComment::new("el  servicio es MALO"),
            RawComment::new("Todo funciona muy bien"),
            RawComment::new("EL SERVICIO ES MALO "),
        ];

        let batch = normalizer.normalize(&raw);

        assert_eq!(batch.comments.len(), 2);
        assert_eq!(batch.comments[0].frequency, 3);
        assert_eq!(batch.comments[0].raw_text, "El servicio es malo");
        assert_eq!(batch.comments[1].id, 1);
        assert_eq!(batch.kept_total(), 4);
    }

    #[test]
    fn test_rejections() {
        let normalizer = TextNormalizer::new(3);
        let raw = vec![
            RawComment { text: json!(42), metadata: Default::default() },
            RawComment { text: json!(null), metadata: Default::default() },
            RawComment::new("   "),
            RawComment::new("123 456 789"),
            RawComment::new("muy malo"),
            RawComment::new("esto sí cuenta"),
        ];

        let batch = normalizer.normalize(&raw);

        assert_eq!(batch.comments.len(), 1);
        assert_eq!(batch.rejected[&RejectReason::NotText], 2);
        assert_eq!(batch.rejected[&RejectReason::Empty], 1);
        assert_eq!(batch.rejected[&RejectReason::NoLetters], 1);
        assert_eq!(batch.rejected[&RejectReason::TooShort], 1);
        assert_eq!(batch.rejected_total(), 5);
    }

    #[test]
    fn test_min_words_is_configurable() {
        let normalizer = TextNormalizer::new(1);
        let batch = normalizer.normalize(&[RawComment::new("Bien")]);
        assert_eq!(batch.comments.len(), 1);
        assert_eq!(batch.comments[0].normalized_text, "bien");
    }

    #[test]
    fn test_metadata_kept_from_first_occurrence() {
        let normalizer = TextNormalizer::new(1);
        let raw = vec![
            RawComment::new("Muy bueno").with_rating(9),
            RawComment::new("muy bueno").with_rating(2),
        ];
        let batch = normalizer.normalize(&raw);
        assert_eq!(batch.comments[0].rating(), Some(9));
    }
}
