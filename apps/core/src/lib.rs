//! Customer feedback analysis core.
//!
//! Turns free-text comments into per-comment sentiment, emotion, theme and
//! urgency verdicts plus portfolio metrics (NPS, churn risk, urgency tiers).
//! Uses an external completion service when one is configured and falls
//! back to deterministic rules whenever it is not, or fails.

pub mod actors;
pub mod brain;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod rate_limiter;

#[cfg(test)]
mod tests;

pub use config::AnalysisConfig;
pub use error::{AppError, ServiceError};
pub use models::{AnalysisOutcome, AnalysisReport, AnalysisRequest, RawComment};
pub use pipeline::AnalysisOrchestrator;
