use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::batch_client::LlmBatchClient;
use super::context::RunContext;
use super::merger::{coverage_pct, HybridMerger, MergedBatch};
use super::metrics::MetricsAggregator;
use crate::actors::{CompletionBackend, LlmActorHandle};
use crate::brain::{detect_language, Language, NormalizedBatch, RejectReason, RuleBasedAnalyzer, ScoringRubric, TextNormalizer};
use crate::cache::{cache_key, ResponseCache, SharedCache};
use crate::config::AnalysisConfig;
use crate::error::{AppError, ServiceError};
use crate::models::{
    AnalysisMethod, AnalysisOutcome, AnalysisReport, AnalysisRequest, AnalysisResult, BatchJob, BatchMode,
    Comment, CommentAnalysis, ServiceNotification, Severity, ValidationReport,
};
use crate::rate_limiter::{RateLimiter, SharedRateLimiter};

/// States of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    AttemptAi,
    Hybrid,
    FallbackRule,
    DoneAi,
    DoneHybrid,
    DoneRule,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::DoneAi | RunState::DoneHybrid | RunState::DoneRule)
    }

    pub fn method(&self) -> Option<AnalysisMethod> {
        match self {
            RunState::DoneAi => Some(AnalysisMethod::AiPowered),
            RunState::DoneHybrid => Some(AnalysisMethod::HybridAiRule),
            RunState::DoneRule => Some(AnalysisMethod::RuleBasedFallback),
            _ => None,
        }
    }
}

/// Entry point of the analysis core.
///
/// Decides per run whether to use the completion service, the rule
/// analyzer or both, and never lets a service or parsing failure escape:
/// every path ends in one of the three terminal modes.
pub struct AnalysisOrchestrator {
    config: AnalysisConfig,
    normalizer: TextNormalizer,
    merger: HybridMerger,
    aggregator: MetricsAggregator,
    client: Option<LlmBatchClient>,
    cache: SharedCache,
}

impl AnalysisOrchestrator {
    /// Builds the production pipeline. The HTTP actor is only spawned when
    /// credentials are configured.
    pub fn from_config(config: AnalysisConfig) -> Result<Self, AppError> {
        let backend: Option<Arc<dyn CompletionBackend>> = if config.llm.has_credentials() {
            Some(Arc::new(LlmActorHandle::new(&config.llm)?))
        } else {
            None
        };
        Ok(Self::with_backend(config, backend))
    }

    /// Builds a pipeline with its own cache and rate limiter.
    pub fn with_backend(config: AnalysisConfig, backend: Option<Arc<dyn CompletionBackend>>) -> Self {
        let cache = SharedCache::new(ResponseCache::from_settings(&config.cache));
        let limiter = SharedRateLimiter::new(
            RateLimiter::per_minute(config.rate_limit.requests_per_minute),
            Duration::from_millis(config.rate_limit.max_wait_ms),
        );
        Self::with_shared(config, backend, cache, limiter)
    }

    /// Builds a pipeline over a process-scoped cache and rate limiter, so
    /// several orchestrators can share them.
    pub fn with_shared(
        config: AnalysisConfig,
        backend: Option<Arc<dyn CompletionBackend>>,
        cache: SharedCache,
        limiter: SharedRateLimiter,
    ) -> Self {
        let rubric = ScoringRubric::new(config.scoring.clone());
        let client = match backend {
            Some(backend) if config.llm.has_credentials() => Some(LlmBatchClient::new(backend, &config, limiter)),
            _ => None,
        };

        Self {
            normalizer: TextNormalizer::new(config.pipeline.min_words),
            merger: HybridMerger::new(RuleBasedAnalyzer::new(rubric)),
            aggregator: MetricsAggregator::from_config(&config),
            client,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Analyzes one request with no external cancellation.
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisOutcome {
        self.analyze_with_cancel(request, CancellationToken::new()).await
    }

    /// Analyzes one request. Cancelling `cancel` stops new batches from
    /// reaching the service; the affected comments get rule verdicts.
    #[instrument(skip_all, fields(comments = request.comments.len()))]
    pub async fn analyze_with_cancel(&self, request: AnalysisRequest, cancel: CancellationToken) -> AnalysisOutcome {
        let normalized = self.normalizer.normalize(&request.comments);
        if normalized.comments.is_empty() {
            let rejection = rejection(&normalized);
            warn!(reason = %rejection.reason, received = rejection.received, "Input rejected");
            return AnalysisOutcome::Rejected(rejection);
        }

        let language = resolve_language(request.language.as_deref(), &normalized.comments);
        let deadline = self.config.pipeline.run_deadline_secs.map(Duration::from_secs);
        let ctx = RunContext::new(language, &cancel, deadline);
        info!(
            run_id = %ctx.run_id,
            unique = normalized.comments.len(),
            received = normalized.received,
            language = language.code(),
            "Analysis run started"
        );

        let mut state = match &self.client {
            Some(_) => RunState::AttemptAi,
            None => {
                ctx.notify(ServiceNotification::warning(
                    "External analysis service is not configured; all comments were analyzed with rules",
                    Severity::Medium,
                ));
                RunState::FallbackRule
            }
        };
        info!(run_id = %ctx.run_id, ?state, "Initial state");

        let results = match (&self.client, state) {
            (Some(client), RunState::AttemptAi) => self.run_ai(client, &normalized.comments, &ctx).await,
            _ => self.merger.rule_only(&normalized.comments).results,
        };

        let ai_resolved = results.iter().filter(|r| r.source.is_ai_resolved()).count();
        let unique = results.len();
        let coverage = coverage_pct(ai_resolved, unique);

        if state == RunState::AttemptAi && ai_resolved < unique {
            transition(&ctx, &mut state, if ai_resolved == 0 { RunState::FallbackRule } else { RunState::Hybrid });
            ctx.notify(ServiceNotification::warning(
                format!(
                    "AI coverage was {:.1}%: {} of {} comments were analyzed with rules",
                    coverage,
                    unique - ai_resolved,
                    unique
                ),
                if ai_resolved == 0 { Severity::High } else { Severity::Medium },
            ));
        }
        let terminal = match state {
            RunState::AttemptAi => RunState::DoneAi,
            RunState::Hybrid => RunState::DoneHybrid,
            _ => RunState::DoneRule,
        };
        transition(&ctx, &mut state, terminal);

        let analyses: Vec<CommentAnalysis> = normalized
            .comments
            .iter()
            .cloned()
            .zip(results)
            .map(|(comment, result)| CommentAnalysis { comment, result })
            .collect();
        let metrics = self.aggregator.aggregate(&analyses);
        let method = state.method().unwrap_or(AnalysisMethod::RuleBasedFallback);

        info!(
            run_id = %ctx.run_id,
            method = %method,
            ai_coverage_pct = coverage,
            elapsed_ms = ctx.elapsed_ms(),
            "Analysis run finished"
        );

        AnalysisOutcome::Completed(AnalysisReport {
            run_id: ctx.run_id.to_string(),
            total: metrics.total,
            unique_comments: unique,
            rejected_comments: normalized.rejected_total(),
            sentiment_distribution: metrics.sentiment_distribution,
            theme_counts: metrics.theme_counts,
            theme_examples: metrics.theme_examples,
            pain_point_counts: metrics.pain_point_counts,
            nps: metrics.nps,
            churn_analysis: metrics.churn_analysis,
            urgency_distribution: metrics.urgency_distribution,
            emotion_summary: metrics.emotion_summary,
            analysis_method: method,
            ai_coverage_pct: coverage,
            service_notifications: ctx.notifications(),
            results: analyses,
        })
    }

    /// Cache lookup, then AI batches for the misses. Returns one result per
    /// comment, in comment order.
    async fn run_ai(&self, client: &LlmBatchClient, comments: &[Comment], ctx: &RunContext) -> Vec<AnalysisResult> {
        let expired = self.cache.evict_expired();
        if expired > 0 {
            debug!(run_id = %ctx.run_id, expired, "Evicted expired cache entries");
        }

        let mut slots: Vec<Option<AnalysisResult>> = vec![None; comments.len()];
        let mut misses = Vec::new();

        for comment in comments {
            let key = cache_key(&comment.normalized_text, ctx.language.code());
            match self.cache.get(&key) {
                Some(mut hit) => {
                    hit.comment_id = comment.id;
                    slots[comment.id] = Some(hit);
                }
                None => misses.push(comment.clone()),
            }
        }
        let hits = comments.len() - misses.len();
        if hits > 0 {
            info!(run_id = %ctx.run_id, hits, misses = misses.len(), "Cache lookup");
        }

        let jobs: Vec<BatchJob> = client
            .budget()
            .plan(misses)
            .into_iter()
            .enumerate()
            .map(|(index, comments)| BatchJob {
                index,
                comments,
                mode: BatchMode::Ai,
                attempt: 0,
            })
            .collect();

        let merged: Vec<MergedBatch> = stream::iter(jobs)
            .map(|job| self.run_batch(client, job, ctx))
            .buffer_unordered(self.config.batch.max_concurrent.max(1))
            .collect()
            .await;

        for batch in merged {
            for result in batch.results {
                let id = result.comment_id;
                slots[id] = Some(result);
            }
        }

        comments
            .iter()
            .zip(slots)
            .map(|(comment, slot)| slot.unwrap_or_else(|| self.merger.analyzer().analyze(comment)))
            .collect()
    }

    async fn run_batch(&self, client: &LlmBatchClient, mut job: BatchJob, ctx: &RunContext) -> MergedBatch {
        if ctx.is_cancelled() {
            self.on_batch_failure(&ServiceError::Cancelled, job.index, ctx);
        }
        if ctx.ai_disabled() {
            job.mode = BatchMode::Rule;
            return self.merger.rule_only(&job.comments);
        }

        match client.analyze_batch(&mut job, ctx).await {
            Ok(outcome) => {
                if !outcome.failed.is_empty() {
                    job.mode = BatchMode::Hybrid;
                }
                let merged = self.merger.merge(&job.comments, outcome.succeeded);
                if !ctx.is_cancelled() {
                    self.store(&job.comments, &merged, ctx);
                }
                info!(
                    run_id = %ctx.run_id,
                    batch = job.index,
                    mode = ?job.mode,
                    coverage = merged.coverage_pct(),
                    "Batch merged"
                );
                merged
            }
            Err(err) => {
                job.mode = BatchMode::Rule;
                self.on_batch_failure(&err, job.index, ctx);
                self.merger.rule_only(&job.comments)
            }
        }
    }

    /// A batch-level failure stops AI for the rest of the run.
    fn on_batch_failure(&self, err: &ServiceError, batch: usize, ctx: &RunContext) {
        if !ctx.disable_ai(&err.to_string()) {
            return;
        }
        let notification = match err {
            ServiceError::Cancelled => ServiceNotification::warning(
                "Analysis was cancelled or hit its deadline; remaining comments were analyzed with rules",
                Severity::Medium,
            ),
            ServiceError::Auth(_) => ServiceNotification::error(
                "External analysis service rejected the credentials; switched to rule-based analysis",
            ),
            other => ServiceNotification::warning(
                format!("External analysis service failed ({}); switched to rule-based analysis", other),
                Severity::High,
            ),
        };
        warn!(run_id = %ctx.run_id, batch, error = %err, "Falling back to rules for the rest of the run");
        ctx.notify(notification);
    }

    fn store(&self, comments: &[Comment], merged: &MergedBatch, ctx: &RunContext) {
        let mut cache = self.cache.lock();
        for (comment, result) in comments.iter().zip(&merged.results) {
            if result.source.is_ai_resolved() {
                let key = cache_key(&comment.normalized_text, ctx.language.code());
                cache.put(key, result.clone(), None);
            }
        }
    }
}

fn transition(ctx: &RunContext, state: &mut RunState, next: RunState) {
    if *state != next {
        info!(run_id = %ctx.run_id, from = ?*state, to = ?next, "State transition");
        *state = next;
    }
}

fn resolve_language(hint: Option<&str>, comments: &[Comment]) -> Language {
    match hint.map(Language::from_hint) {
        Some(language) if language != Language::Unknown => language,
        _ => detect_language(comments.iter().map(|c| c.normalized_text.as_str())),
    }
}

fn rejection(batch: &NormalizedBatch) -> ValidationReport {
    let reason = if batch.received == 0 {
        "empty input: no comments were provided".to_string()
    } else {
        let too_short = batch.rejected.get(&RejectReason::TooShort).copied().unwrap_or(0);
        format!(
            "no analyzable comments: all {} comments were empty, non-text, without letters or too short ({} too short)",
            batch.received, too_short
        )
    };
    ValidationReport {
        reason,
        received: batch.received,
        rejected: batch.rejected_total(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_map_to_methods() {
        assert_eq!(RunState::DoneAi.method(), Some(AnalysisMethod::AiPowered));
        assert_eq!(RunState::DoneHybrid.method(), Some(AnalysisMethod::HybridAiRule));
        assert_eq!(RunState::DoneRule.method(), Some(AnalysisMethod::RuleBasedFallback));
        assert_eq!(RunState::Hybrid.method(), None);
        assert!(!RunState::AttemptAi.is_terminal());
    }

    #[test]
    fn test_language_hint_wins_over_detection() {
        let comments = vec![Comment {
            id: 0,
            raw_text: "the service is very slow".into(),
            normalized_text: "the service is very slow".into(),
            frequency: 1,
            metadata: Default::default(),
        }];
        assert_eq!(resolve_language(Some("es"), &comments), Language::Spanish);
        assert_eq!(resolve_language(Some("klingon"), &comments), Language::English);
        assert_eq!(resolve_language(None, &comments), Language::English);
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let orchestrator = AnalysisOrchestrator::with_backend(AnalysisConfig::default(), None);
        let outcome = orchestrator.analyze(AnalysisRequest::default()).await;
        match outcome {
            AnalysisOutcome::Rejected(report) => {
                assert_eq!(report.received, 0);
                assert!(report.reason.starts_with("empty input"));
            }
            AnalysisOutcome::Completed(_) => panic!("empty input must be rejected"),
        }
    }
}
