//! Urgency, churn and synthetic NPS rubrics.
//!
//! Shared by the rule analyzer, the AI response parser and the metrics
//! aggregator so every source is held to the same P0 rule. Weights come
//! from [`ScoringPolicy`].

use serde::{Deserialize, Serialize};

use super::lexicon::{MatchText, HOSTILE_EMOTIONS, LEXICON, WARM_EMOTIONS};
use crate::config::ScoringPolicy;
use crate::models::{AnalysisResult, Sentiment, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChurnRisk {
    High,
    Medium,
    Low,
}

/// Synthetic 0-10 score, by sentiment and whether the matching emotions are strong.
///
/// | sentiment | strong emotion | score |
/// |-----------|----------------|-------|
/// | positive  | yes            | 10    |
/// | positive  | no             | 9     |
/// | neutral   | -              | 7     |
/// | negative  | no             | 4     |
/// | negative  | yes            | 1     |
const NPS_POSITIVE_STRONG: u8 = 10;
const NPS_POSITIVE: u8 = 9;
const NPS_NEUTRAL: u8 = 7;
const NPS_NEGATIVE: u8 = 4;
const NPS_NEGATIVE_STRONG: u8 = 1;

#[derive(Debug, Clone, Default)]
pub struct ScoringRubric {
    policy: ScoringPolicy,
}

impl ScoringRubric {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Negative with high confidence, or negative with anger/frustration.
    pub fn is_strongly_negative(&self, result: &AnalysisResult) -> bool {
        result.sentiment == Sentiment::Negative
            && (result.confidence >= self.policy.strong_negative_confidence
                || result.max_emotion(HOSTILE_EMOTIONS) >= self.policy.strong_emotion_intensity)
    }

    /// P0 needs a strongly negative verdict and a critical pain point;
    /// P1 is any other negative verdict with pain points; P2 is the rest of
    /// the negatives plus neutral comments that still name a pain point.
    pub fn classify_urgency(&self, result: &AnalysisResult) -> Urgency {
        let has_pain = !result.pain_points.is_empty();
        let has_critical = result
            .pain_points
            .iter()
            .any(|p| LEXICON.is_critical_pain_point(p));

        match result.sentiment {
            Sentiment::Negative if has_critical && self.is_strongly_negative(result) => Urgency::P0,
            Sentiment::Negative if has_pain => Urgency::P1,
            Sentiment::Negative => Urgency::P2,
            Sentiment::Neutral if has_pain => Urgency::P2,
            _ => Urgency::P3,
        }
    }

    /// Keeps a proposed urgency unless it claims P0 without meeting the P0 rule.
    pub fn reconcile_urgency(&self, proposed: Option<Urgency>, result: &AnalysisResult) -> Urgency {
        let rubric = self.classify_urgency(result);
        match proposed {
            Some(Urgency::P0) if rubric != Urgency::P0 => Urgency::P1,
            Some(urgency) => urgency,
            None => rubric,
        }
    }

    /// Weighted churn score of one comment.
    pub fn churn_score(&self, text: &str, result: &AnalysisResult) -> u32 {
        let text = MatchText::new(text);
        let policy = &self.policy;

        let mut score = LEXICON.churn_high.distinct_hits(&text) as u32 * policy.churn_high_indicator_weight
            + LEXICON.churn_medium.distinct_hits(&text) as u32 * policy.churn_medium_indicator_weight;
        if result.sentiment == Sentiment::Negative {
            score += policy.churn_negative_sentiment_weight;
        }
        if result.max_emotion(HOSTILE_EMOTIONS) >= policy.strong_emotion_intensity {
            score += policy.churn_emotion_weight;
        }
        score
    }

    pub fn churn_risk(&self, text: &str, result: &AnalysisResult) -> ChurnRisk {
        let score = self.churn_score(text, result);
        if score >= self.policy.churn_high_threshold {
            ChurnRisk::High
        } else if score >= self.policy.churn_medium_threshold {
            ChurnRisk::Medium
        } else {
            ChurnRisk::Low
        }
    }

    /// Derives a 0-10 recommendation score from sentiment and emotion intensity.
    pub fn synthetic_nps(&self, result: &AnalysisResult) -> u8 {
        let strong = self.policy.strong_emotion_intensity;
        match result.sentiment {
            Sentiment::Positive if result.max_emotion(WARM_EMOTIONS) >= strong => NPS_POSITIVE_STRONG,
            Sentiment::Positive => NPS_POSITIVE,
            Sentiment::Neutral => NPS_NEUTRAL,
            Sentiment::Negative if result.max_emotion(HOSTILE_EMOTIONS) >= strong => NPS_NEGATIVE_STRONG,
            Sentiment::Negative => NPS_NEGATIVE,
        }
    }
}
