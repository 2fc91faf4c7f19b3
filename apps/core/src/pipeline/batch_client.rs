//! Batch client for the external completion service.
//!
//! Packs comments into requests that fit the model's context window, waits
//! on the shared rate limiter, retries transient failures with exponential
//! backoff plus jitter, and parses the answer comment by comment.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::context::RunContext;
use super::prompt::{build_prompt, parse_response, SYSTEM_PROMPT};
use crate::actors::{CompletionBackend, CompletionRequest};
use crate::brain::ScoringRubric;
use crate::config::{AnalysisConfig, RetrySettings};
use crate::error::{AppError, ServiceError};
use crate::models::{AnalysisResult, BatchJob, Comment};
use crate::rate_limiter::SharedRateLimiter;

/// Rough characters-per-token ratio for budgeting.
const CHARS_PER_TOKEN: usize = 4;

/// Request size estimator and batch planner.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    pub base_overhead: u32,
    pub per_comment_overhead: u32,
    pub safety_margin: f32,
    /// Prompt tokens available once the reply's `max_tokens` is reserved.
    pub available: u32,
    pub hard_cap: usize,
}

impl TokenBudget {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            base_overhead: config.batch.base_overhead_tokens,
            per_comment_overhead: config.batch.per_comment_overhead_tokens,
            safety_margin: config.batch.safety_margin,
            available: config.llm.context_limit.saturating_sub(config.llm.max_tokens),
            hard_cap: config.batch.max_comments.max(1),
        }
    }

    pub fn comment_tokens(&self, comment: &Comment) -> u32 {
        let chars = comment.normalized_text.chars().count();
        chars.div_ceil(CHARS_PER_TOKEN) as u32 + self.per_comment_overhead
    }

    /// `base + sum(per-comment tokens) x safety margin`.
    pub fn estimate(&self, comments: &[Comment]) -> u32 {
        let body: u32 = comments.iter().map(|c| self.comment_tokens(c)).sum();
        self.estimate_from(body)
    }

    fn estimate_from(&self, body_tokens: u32) -> u32 {
        self.base_overhead + (body_tokens as f32 * self.safety_margin).ceil() as u32
    }

    /// Greedy packing in input order. A comment too large for any batch is
    /// sent alone.
    pub fn plan(&self, comments: Vec<Comment>) -> Vec<Vec<Comment>> {
        let mut batches = Vec::new();
        let mut current: Vec<Comment> = Vec::new();
        let mut current_tokens = 0u32;

        for comment in comments {
            let tokens = self.comment_tokens(&comment);
            let fits = current.len() < self.hard_cap
                && self.estimate_from(current_tokens + tokens) <= self.available;
            if !fits && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current_tokens += tokens;
            current.push(comment);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}

/// Delay before retry number `attempt` (1-based count of failed attempts).
///
/// `base x 2^(attempt-1)`, raised to the server's `Retry-After` when given,
/// capped at `max_delay`, plus up to `jitter_ratio` of random extra.
pub fn backoff_delay<R: Rng>(
    retry: &RetrySettings,
    attempt: u32,
    retry_after: Option<Duration>,
    rng: &mut R,
) -> Duration {
    let shift = attempt.saturating_sub(1).min(20);
    let mut delay_ms = retry.base_delay_ms.saturating_mul(1u64 << shift);
    if let Some(hint) = retry_after {
        delay_ms = delay_ms.max(hint.as_millis() as u64);
    }
    delay_ms = delay_ms.min(retry.max_delay_ms);

    let jitter_ms = (delay_ms as f64 * retry.jitter_ratio) as u64;
    if jitter_ms > 0 {
        delay_ms += rng.gen_range(0..=jitter_ms);
    }
    Duration::from_millis(delay_ms)
}

/// What came back for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// AI verdicts, in batch order.
    pub succeeded: Vec<AnalysisResult>,
    /// Comments the service did not answer usably.
    pub failed: Vec<usize>,
    pub attempts: u32,
}

pub struct LlmBatchClient {
    backend: Arc<dyn CompletionBackend>,
    limiter: SharedRateLimiter,
    retry: RetrySettings,
    budget: TokenBudget,
    temperature: f32,
    max_tokens: u32,
    rubric: ScoringRubric,
}

impl LlmBatchClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &AnalysisConfig, limiter: SharedRateLimiter) -> Self {
        Self {
            backend,
            limiter,
            retry: config.retry.clone(),
            budget: TokenBudget::from_config(config),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            rubric: ScoringRubric::new(config.scoring.clone()),
        }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Sends one batch, retrying transient failures.
    ///
    /// Errors are batch-level: the service could not be used at all. A
    /// response that parses only partly is still `Ok`, with the unusable
    /// comments listed in `failed`.
    pub async fn analyze_batch(&self, job: &mut BatchJob, ctx: &RunContext) -> Result<BatchOutcome, ServiceError> {
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(&job.comments, ctx.language),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let max_attempts = self.retry.max_attempts.max(1);

        loop {
            job.attempt += 1;
            if ctx.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }

            let err = match self.send(request.clone(), ctx).await {
                Ok(raw) => {
                    let parsed = parse_response(&raw, &job.comments, &self.rubric);
                    info!(
                        run_id = %ctx.run_id,
                        batch = job.index,
                        attempt = job.attempt,
                        parsed = parsed.results.len(),
                        failed = parsed.failed.len(),
                        "Batch analyzed"
                    );
                    return Ok(BatchOutcome {
                        succeeded: parsed.results,
                        failed: parsed.failed,
                        attempts: job.attempt,
                    });
                }
                Err(err) => err,
            };

            if !err.is_transient() || job.attempt >= max_attempts {
                warn!(
                    run_id = %ctx.run_id,
                    batch = job.index,
                    attempt = job.attempt,
                    error = %err,
                    "Batch failed"
                );
                return Err(err);
            }

            let retry_after = match &err {
                ServiceError::RateLimited { retry_after } => *retry_after,
                _ => None,
            };
            let delay = backoff_delay(&self.retry, job.attempt, retry_after, &mut rand::thread_rng());
            warn!(
                run_id = %ctx.run_id,
                batch = job.index,
                attempt = job.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient service failure, backing off"
            );

            tokio::select! {
                _ = ctx.cancel_token().cancelled() => return Err(ServiceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn send(&self, request: CompletionRequest, ctx: &RunContext) -> Result<String, ServiceError> {
        self.limiter
            .acquire(ctx.cancel_token())
            .await
            .map_err(|e| match e {
                AppError::Cancelled => ServiceError::Cancelled,
                AppError::RateLimited => ServiceError::RateLimited { retry_after: None },
                other => ServiceError::Transient(other.to_string()),
            })?;

        debug!(run_id = %ctx.run_id, "Dispatching completion request");
        tokio::select! {
            _ = ctx.cancel_token().cancelled() => Err(ServiceError::Cancelled),
            result = self.backend.complete(request) => result,
        }
    }
}
