//! Language detection for feedback comments.
//!
//! Character and function-word heuristics only; good enough to pick a cache
//! namespace and a prompt hint when the caller gives none.

use serde::{Deserialize, Serialize};

use super::lexicon::fold_accents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Spanish,
    English,
    Mixed,
    Unknown,
}

impl Language {
    /// Short code used in cache keys and prompts.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Spanish => "es",
            Language::English => "en",
            Language::Mixed => "mixed",
            Language::Unknown => "unknown",
        }
    }

    /// Maps a caller-supplied hint (`"es"`, `"Spanish"`, `"es-MX"`...) to a language.
    pub fn from_hint(hint: &str) -> Self {
        let lower = hint.trim().to_lowercase();
        let primary = lower.split(['-', '_']).next().unwrap_or("");
        match primary {
            "es" | "spa" | "spanish" | "espanol" | "español" => Language::Spanish,
            "en" | "eng" | "english" | "ingles" | "inglés" => Language::English,
            "mixed" => Language::Mixed,
            _ => Language::Unknown,
        }
    }
}

const SPANISH_WORDS: &[&str] = &[
    "el", "la", "los", "las", "un", "una", "de", "del", "y", "o", "pero", "que", "es",
    "son", "muy", "no", "con", "sin", "por", "para", "mi", "me", "se", "lo", "esta",
    "servicio", "bien", "malo", "gracias", "siempre", "nunca", "porque", "tambien",
];

const ENGLISH_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had",
    "do", "does", "did", "i", "you", "it", "we", "they", "and", "or", "but", "for",
    "with", "from", "to", "in", "on", "my", "not", "very", "service", "good", "bad",
    "thanks", "always", "never", "because",
];

/// Detects the dominant language of a set of texts.
pub fn detect_language<'a, I>(texts: I) -> Language
where
    I: IntoIterator<Item = &'a str>,
{
    let mut spanish_score = 0usize;
    let mut english_score = 0usize;

    for text in texts {
        spanish_score += text
            .chars()
            .filter(|c| matches!(*c, 'á' | 'é' | 'í' | 'ó' | 'ú' | 'ñ' | '¿' | '¡'))
            .count();

        let folded = fold_accents(&text.to_lowercase());
        for word in folded.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            if SPANISH_WORDS.contains(&word) {
                spanish_score += 1;
            }
            if ENGLISH_WORDS.contains(&word) {
                english_score += 1;
            }
        }
    }

    if spanish_score > 0 && english_score > 0 {
        if spanish_score > english_score * 2 {
            Language::Spanish
        } else if english_score > spanish_score * 2 {
            Language::English
        } else {
            Language::Mixed
        }
    } else if spanish_score > 0 {
        Language::Spanish
    } else if english_score > 0 {
        Language::English
    } else {
        Language::Unknown
    }
}
