//! Combines AI verdicts with rule-based fallbacks.

use std::collections::HashMap;

use crate::brain::{RuleAnalysis, RuleBasedAnalyzer};
use crate::models::{AnalysisResult, Comment, ResultSource};

/// A per-comment verdict before it is flattened into an [`AnalysisResult`].
#[derive(Debug, Clone)]
pub enum Verdict {
    Ai(AnalysisResult),
    Rule(RuleAnalysis),
}

/// Results of one batch, in batch order.
#[derive(Debug, Clone, Default)]
pub struct MergedBatch {
    pub results: Vec<AnalysisResult>,
    pub ai_resolved: usize,
    pub rule_resolved: usize,
}

impl MergedBatch {
    pub fn coverage_pct(&self) -> f64 {
        coverage_pct(self.ai_resolved, self.ai_resolved + self.rule_resolved)
    }
}

/// Share of AI-resolved comments, in percent with one decimal.
///
/// Only a fully AI-resolved set reports 100.0 and only a set with no AI
/// verdict reports 0.0; partial coverage stays within `[0.1, 99.9]`.
pub fn coverage_pct(ai_resolved: usize, total: usize) -> f64 {
    if total == 0 || ai_resolved == 0 {
        return 0.0;
    }
    if ai_resolved >= total {
        return 100.0;
    }
    let pct = ai_resolved as f64 / total as f64 * 100.0;
    ((pct * 10.0).round() / 10.0).clamp(0.1, 99.9)
}

#[derive(Debug, Clone, Default)]
pub struct HybridMerger {
    analyzer: RuleBasedAnalyzer,
}

impl HybridMerger {
    pub fn new(analyzer: RuleBasedAnalyzer) -> Self {
        Self { analyzer }
    }

    pub fn analyzer(&self) -> &RuleBasedAnalyzer {
        &self.analyzer
    }

    /// Gives every comment without an AI verdict a rule verdict.
    ///
    /// An AI verdict that names neither themes nor pain points borrows them
    /// from the rule pass and becomes `HYBRID` when the rules found any.
    pub fn merge(&self, comments: &[Comment], ai_results: Vec<AnalysisResult>) -> MergedBatch {
        let mut by_id: HashMap<usize, AnalysisResult> =
            ai_results.into_iter().map(|r| (r.comment_id, r)).collect();

        let verdicts = comments.iter().map(|comment| match by_id.remove(&comment.id) {
            Some(result) => Verdict::Ai(result),
            None => Verdict::Rule(self.analyzer.inspect(comment.id, &comment.normalized_text)),
        });

        let mut merged = MergedBatch::default();
        for (comment, verdict) in comments.iter().zip(verdicts) {
            let result = match verdict {
                Verdict::Ai(result) => {
                    merged.ai_resolved += 1;
                    self.complete_ai(comment, result)
                }
                Verdict::Rule(analysis) => {
                    merged.rule_resolved += 1;
                    analysis.into_result(self.analyzer.rubric())
                }
            };
            merged.results.push(result);
        }
        merged
    }

    /// Rule verdicts for the whole batch.
    pub fn rule_only(&self, comments: &[Comment]) -> MergedBatch {
        self.merge(comments, Vec::new())
    }

    fn complete_ai(&self, comment: &Comment, mut result: AnalysisResult) -> AnalysisResult {
        if !result.themes.is_empty() || !result.pain_points.is_empty() {
            return result;
        }
        let rules = self.analyzer.inspect(comment.id, &comment.normalized_text);
        if rules.themes.is_empty() && rules.pain_points.is_empty() {
            return result;
        }
        result.themes = rules.themes;
        result.pain_points = rules.pain_points;
        result.source = ResultSource::Hybrid;
        result.urgency = self.analyzer.rubric().reconcile_urgency(Some(result.urgency), &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentiment;

    fn comments(texts: &[&str]) -> Vec<Comment> {
        texts
            .iter()
            .enumerate()
            .map(|(id, text)| Comment {
                id,
                raw_text: text.to_string(),
                normalized_text: text.to_string(),
                frequency: 1,
                metadata: Default::default(),
            })
            .collect()
    }

    fn ai(comment_id: usize, sentiment: Sentiment, themes: &[&str]) -> AnalysisResult {
        let mut result = AnalysisResult::unknown(comment_id, ResultSource::Ai);
        result.sentiment = sentiment;
        result.confidence = 0.9;
        result.themes = themes.iter().map(|t| t.to_string()).collect();
        result
    }

    #[test]
    fn test_failed_comments_get_rule_results() {
        let merger = HybridMerger::default();
        let batch = comments(&["excelente servicio", "internet muy lento", "pésima atención"]);

        let merged = merger.merge(&batch, vec![ai(0, Sentiment::Positive, &["service"])]);

        assert_eq!(merged.results.len(), 3);
        assert_eq!(merged.results[0].source, ResultSource::Ai);
        assert_eq!(merged.results[1].source, ResultSource::Rule);
        assert_eq!(merged.results[2].source, ResultSource::Rule);
        assert_eq!(merged.results[2].sentiment, Sentiment::Negative);
        assert_eq!(merged.ai_resolved, 1);
        assert_eq!(merged.coverage_pct(), 33.3);
    }

    #[test]
    fn test_results_follow_batch_order() {
        let merger = HybridMerger::default();
        let batch = comments(&["uno dos tres", "cuatro cinco seis", "siete ocho nueve"]);
        let merged = merger.merge(
            &batch,
            vec![ai(2, Sentiment::Neutral, &["x"]), ai(0, Sentiment::Neutral, &["x"])],
        );
        let ids: Vec<usize> = merged.results.iter().map(|r| r.comment_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_ai_themes_become_hybrid() {
        let merger = HybridMerger::default();
        let batch = comments(&["la factura vino con un cobro doble"]);

        let merged = merger.merge(&batch, vec![ai(0, Sentiment::Negative, &[])]);

        let result = &merged.results[0];
        assert_eq!(result.source, ResultSource::Hybrid);
        assert!(result.themes.contains(&"billing".to_string()));
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert_eq!(merged.ai_resolved, 1);
    }

    #[test]
    fn test_coverage_bounds() {
        assert_eq!(coverage_pct(0, 0), 0.0);
        assert_eq!(coverage_pct(7, 10), 70.0);
        assert_eq!(coverage_pct(10, 10), 100.0);
        assert_eq!(coverage_pct(2, 3), 66.7);
    }

    #[test]
    fn test_partial_coverage_never_rounds_to_a_bound() {
        assert_eq!(coverage_pct(1999, 2000), 99.9);
        assert_eq!(coverage_pct(1, 20000), 0.1);
        assert_eq!(coverage_pct(19999, 20000), 99.9);
        assert_eq!(coverage_pct(0, 20000), 0.0);
        assert_eq!(coverage_pct(20000, 20000), 100.0);
    }

    #[test]
    fn test_rule_only() {
        let merger = HybridMerger::default();
        let merged = merger.rule_only(&comments(&["excelente servicio"]));
        assert_eq!(merged.rule_resolved, 1);
        assert_eq!(merged.coverage_pct(), 0.0);
    }
}
