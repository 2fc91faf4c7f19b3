//! Rule-based analyzer - the availability floor of the pipeline.
//!
//! Classifies a comment with weighted keyword and phrase lists:
//! 1. Positive vs negative weighted hits (phrases count double)
//! 2. Subtle indicator lists break ties
//! 3. Emotions, pain points and themes from their category lexicons
//! 4. Urgency from the shared rubric
//!
//! Total and deterministic: the same text always yields the same result.

use std::collections::BTreeMap;

use super::lexicon::{MatchText, EMOTION_INTENSITY_STEP, LEXICON};
use super::scoring::ScoringRubric;
use crate::models::{AnalysisResult, Comment, ResultSource, Sentiment, Urgency};

/// Confidence when the main polarity lists decided the verdict.
pub const RULE_CONFIDENCE: f32 = 0.6;
/// Confidence when only the subtle lists decided it.
pub const SUBTLE_CONFIDENCE: f32 = 0.4;

/// Everything the rule pass found, before it is flattened into an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuleAnalysis {
    pub comment_id: usize,
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub positive_score: f32,
    pub negative_score: f32,
    pub emotions: BTreeMap<String, f32>,
    pub themes: Vec<String>,
    pub pain_points: Vec<String>,
}

impl RuleAnalysis {
    pub fn into_result(self, rubric: &ScoringRubric) -> AnalysisResult {
        let mut result = AnalysisResult {
            comment_id: self.comment_id,
            sentiment: self.sentiment,
            confidence: self.confidence,
            emotions: self.emotions,
            themes: self.themes,
            pain_points: self.pain_points,
            nps_score: None,
            urgency: Urgency::P3,
            source: ResultSource::Rule,
        };
        result.urgency = rubric.classify_urgency(&result);
        result
    }
}

/// Keyword-driven sentiment, emotion and theme classifier.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedAnalyzer {
    rubric: ScoringRubric,
}

impl RuleBasedAnalyzer {
    pub fn new(rubric: ScoringRubric) -> Self {
        Self { rubric }
    }

    pub fn rubric(&self) -> &ScoringRubric {
        &self.rubric
    }

    /// Full rule pass over one text.
    pub fn inspect(&self, comment_id: usize, text: &str) -> RuleAnalysis {
        let text = MatchText::new(text);

        // A negated term counts for the other side.
        let (positive_plain, positive_negated) = LEXICON.positive.polarity_hits(&text);
        let (negative_plain, negative_negated) = LEXICON.negative.polarity_hits(&text);
        let positive_score = positive_plain + negative_negated;
        let negative_score = negative_plain + positive_negated;
        let (sentiment, confidence) = self.decide(&text, positive_score, negative_score);

        let emotions = LEXICON
            .emotions
            .iter()
            .filter_map(|category| {
                let hits = category.terms.distinct_hits(&text);
                (hits > 0).then(|| {
                    let intensity = (hits as f32 * EMOTION_INTENSITY_STEP).min(1.0);
                    (category.name.to_string(), intensity)
                })
            })
            .collect();

        let pain_points = LEXICON
            .pain_points
            .iter()
            .filter(|category| category.terms.any(&text))
            .map(|category| category.name.to_string())
            .collect();

        let themes = LEXICON
            .themes
            .iter()
            .filter(|category| category.terms.any(&text))
            .map(|category| category.name.to_string())
            .collect();

        RuleAnalysis {
            comment_id,
            sentiment,
            confidence,
            positive_score,
            negative_score,
            emotions,
            themes,
            pain_points,
        }
    }

    fn decide(&self, text: &MatchText, positive: f32, negative: f32) -> (Sentiment, f32) {
        if positive > negative {
            return (Sentiment::Positive, RULE_CONFIDENCE);
        }
        if negative > positive {
            return (Sentiment::Negative, RULE_CONFIDENCE);
        }

        let subtle_positive = LEXICON.subtle_positive.weighted_hits(text);
        let subtle_negative = LEXICON.subtle_negative.weighted_hits(text);
        if subtle_positive > subtle_negative {
            (Sentiment::Positive, SUBTLE_CONFIDENCE)
        } else if subtle_negative > subtle_positive {
            (Sentiment::Negative, SUBTLE_CONFIDENCE)
        } else if positive > 0.0 || subtle_positive > 0.0 {
            // Balanced signals: a real neutral.
            (Sentiment::Neutral, SUBTLE_CONFIDENCE)
        } else {
            // No signal at all: unknown maps to neutral with zero confidence.
            (Sentiment::Neutral, 0.0)
        }
    }

    pub fn analyze_text(&self, comment_id: usize, text: &str) -> AnalysisResult {
        self.inspect(comment_id, text).into_result(&self.rubric)
    }

    pub fn analyze(&self, comment: &Comment) -> AnalysisResult {
        self.analyze_text(comment.id, &comment.normalized_text)
    }
}
