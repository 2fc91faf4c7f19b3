//! # Brain Module
//!
//! Fast, non-LLM analysis for customer feedback.
//! Always available: the pipeline falls back to it whenever the external
//! completion service cannot answer.
//!
//! ## Components
//! - `normalizer`: cleaning, spelling fixes and deduplication
//! - `language`: language detection for cache keys and prompts
//! - `lexicon`: weighted keyword/phrase tables (ES + EN)
//! - `analyzer`: rule-based sentiment, emotion, pain point and theme classifier
//! - `scoring`: urgency, churn and synthetic NPS rubrics

pub mod analyzer;
pub mod language;
pub mod lexicon;
pub mod normalizer;
pub mod scoring;

pub use analyzer::{RuleAnalysis, RuleBasedAnalyzer};
pub use language::{detect_language, Language};
pub use normalizer::{NormalizedBatch, RejectReason, TextNormalizer};
pub use scoring::{ChurnRisk, ScoringRubric};
