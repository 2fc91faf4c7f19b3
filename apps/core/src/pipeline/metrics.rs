//! Portfolio-level metrics over the per-comment results of one run.
//!
//! Every count is weighted by comment frequency, so a complaint that came
//! in five times weighs five times.

use std::collections::{BTreeMap, HashMap};

use crate::brain::{ChurnRisk, ScoringRubric};
use crate::config::AnalysisConfig;
use crate::models::{
    CategoryShare, ChurnAnalysis, CommentAnalysis, NpsBasis, NpsSummary, Sentiment, SentimentDistribution,
    UrgencyDistribution,
};

const PROMOTER_MIN: u8 = 9;
const DETRACTOR_MAX: u8 = 6;

/// Everything the aggregator derives from a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateMetrics {
    pub total: usize,
    pub sentiment_distribution: SentimentDistribution,
    pub theme_counts: Vec<(String, usize)>,
    pub theme_examples: BTreeMap<String, Vec<String>>,
    pub pain_point_counts: Vec<(String, usize)>,
    pub nps: NpsSummary,
    pub churn_analysis: ChurnAnalysis,
    pub urgency_distribution: UrgencyDistribution,
    pub emotion_summary: Vec<(String, f32)>,
}

#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    rubric: ScoringRubric,
    max_theme_examples: usize,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl MetricsAggregator {
    pub fn new(rubric: ScoringRubric, max_theme_examples: usize) -> Self {
        Self {
            rubric,
            max_theme_examples,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            ScoringRubric::new(config.scoring.clone()),
            config.pipeline.max_theme_examples,
        )
    }

    pub fn aggregate(&self, analyses: &[CommentAnalysis]) -> AggregateMetrics {
        let total: usize = analyses.iter().map(|a| a.comment.frequency).sum();

        AggregateMetrics {
            total,
            sentiment_distribution: sentiment_distribution(analyses, total),
            theme_counts: ranked_counts(analyses, |a| &a.result.themes),
            theme_examples: self.theme_examples(analyses),
            pain_point_counts: ranked_counts(analyses, |a| &a.result.pain_points),
            nps: self.nps(analyses, total),
            churn_analysis: self.churn(analyses),
            urgency_distribution: analyses.iter().fold(UrgencyDistribution::default(), |mut dist, a| {
                dist.record(a.result.urgency, a.comment.frequency);
                dist
            }),
            emotion_summary: emotion_summary(analyses, total),
        }
    }

    fn theme_examples(&self, analyses: &[CommentAnalysis]) -> BTreeMap<String, Vec<String>> {
        let mut examples: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for analysis in analyses {
            for theme in &analysis.result.themes {
                let list = examples.entry(theme.clone()).or_default();
                if list.len() < self.max_theme_examples {
                    list.push(analysis.comment.raw_text.clone());
                }
            }
        }
        examples
    }

    /// Explicit rating first, then the AI's score, then the synthetic table.
    fn nps(&self, analyses: &[CommentAnalysis], total: usize) -> NpsSummary {
        let (mut promoters, mut detractors, mut passives) = (0usize, 0usize, 0usize);
        let mut explicit = 0usize;

        for analysis in analyses {
            let weight = analysis.comment.frequency;
            let score = match analysis.comment.rating() {
                Some(rating) => {
                    explicit += weight;
                    rating
                }
                None => analysis
                    .result
                    .nps_score
                    .unwrap_or_else(|| self.rubric.synthetic_nps(&analysis.result)),
            };
            if score >= PROMOTER_MIN {
                promoters += weight;
            } else if score <= DETRACTOR_MAX {
                detractors += weight;
            } else {
                passives += weight;
            }
        }

        let score = if total == 0 {
            0.0
        } else {
            let raw = (promoters as f64 - detractors as f64) / total as f64 * 100.0;
            round1(raw).clamp(-100.0, 100.0)
        };
        let basis = if explicit == 0 {
            NpsBasis::Synthetic
        } else if explicit == total {
            NpsBasis::Explicit
        } else {
            NpsBasis::Mixed
        };

        NpsSummary {
            score,
            promoters,
            detractors,
            passives,
            basis,
        }
    }

    fn churn(&self, analyses: &[CommentAnalysis]) -> ChurnAnalysis {
        let mut churn = ChurnAnalysis::default();
        for analysis in analyses {
            let weight = analysis.comment.frequency;
            match self.rubric.churn_risk(&analysis.comment.normalized_text, &analysis.result) {
                ChurnRisk::High => churn.high_risk += weight,
                ChurnRisk::Medium => churn.medium_risk += weight,
                ChurnRisk::Low => churn.low_risk += weight,
            }
        }
        churn
    }
}

fn sentiment_distribution(analyses: &[CommentAnalysis], total: usize) -> SentimentDistribution {
    let mut counts: HashMap<Sentiment, usize> = HashMap::new();
    for analysis in analyses {
        *counts.entry(analysis.result.sentiment).or_insert(0) += analysis.comment.frequency;
    }
    let share = |sentiment: Sentiment| {
        let count = counts.get(&sentiment).copied().unwrap_or(0);
        CategoryShare {
            count,
            pct: if total == 0 { 0.0 } else { round1(count as f64 / total as f64 * 100.0) },
        }
    };
    SentimentDistribution {
        positive: share(Sentiment::Positive),
        neutral: share(Sentiment::Neutral),
        negative: share(Sentiment::Negative),
    }
}

/// Weighted label counts, highest first, ties by name.
fn ranked_counts<F>(analyses: &[CommentAnalysis], labels: F) -> Vec<(String, usize)>
where
    F: Fn(&CommentAnalysis) -> &Vec<String>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for analysis in analyses {
        for label in labels(analysis) {
            *counts.entry(label.as_str()).or_insert(0) += analysis.comment.frequency;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Mean intensity per emotion over all comments, strongest first.
fn emotion_summary(analyses: &[CommentAnalysis], total: usize) -> Vec<(String, f32)> {
    if total == 0 {
        return Vec::new();
    }
    let mut sums: HashMap<&str, f32> = HashMap::new();
    for analysis in analyses {
        for (emotion, intensity) in &analysis.result.emotions {
            *sums.entry(emotion.as_str()).or_insert(0.0) += intensity * analysis.comment.frequency as f32;
        }
    }
    let mut summary: Vec<(String, f32)> = sums
        .into_iter()
        .map(|(emotion, sum)| {
            let mean = sum / total as f32;
            (emotion.to_string(), (mean * 1000.0).round() / 1000.0)
        })
        .collect();
    summary.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    summary
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
