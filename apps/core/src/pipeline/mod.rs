//! # Pipeline Module
//!
//! Orchestration of one analysis run: cache lookup, batched AI analysis
//! with retry and rate limiting, rule-based fallback, merge and metrics.
//!
//! ## Components
//! - `context`: per-run state (id, cancellation, notifications, AI latch)
//! - `prompt`: request prompt and tolerant response parser
//! - `batch_client`: token budgeting, rate limiting and retry with backoff
//! - `merger`: AI + rule merge and AI coverage
//! - `metrics`: NPS, churn, urgency, sentiment, theme and emotion rollups
//! - `orchestrator`: the AI / hybrid / rule state machine

pub mod batch_client;
pub mod context;
pub mod merger;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;

pub use batch_client::{BatchOutcome, LlmBatchClient, TokenBudget};
pub use context::RunContext;
pub use merger::{HybridMerger, MergedBatch, Verdict};
pub use metrics::{AggregateMetrics, MetricsAggregator};
pub use orchestrator::{AnalysisOrchestrator, RunState};
