//! Configuration surface of the analysis core.
//!
//! Values come from `FEEDBACK_*` environment variables (a `.env` file is
//! honoured) and fall back to the defaults below. Every group is validated
//! before a run can start.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use validator::Validate;

use crate::error::AppError;

const ENV_PREFIX: &str = "FEEDBACK_";

/// Settings for the external completion service.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LlmSettings {
    /// Bearer token. `None` means AI analysis is skipped for every run.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[validate(length(min = 1))]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    /// Tokens reserved for the model's answer.
    #[validate(range(min = 64, max = 32768))]
    pub max_tokens: u32,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    /// Context window of the target model, prompt plus answer.
    #[validate(range(min = 1024))]
    pub context_limit: u32,
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4000,
            temperature: 0.2,
            context_limit: 16384,
            request_timeout_secs: 60,
        }
    }
}

impl LlmSettings {
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Token budgeting and batch dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchSettings {
    /// Never send more comments than this in one request.
    #[validate(range(min = 1, max = 200))]
    pub max_comments: usize,
    /// Prompt tokens spent on instructions regardless of batch size.
    pub base_overhead_tokens: u32,
    /// Per-comment framing tokens (id, quotes, separators).
    pub per_comment_overhead_tokens: u32,
    /// Multiplier applied to the per-comment estimate.
    #[validate(range(min = 1.0, max = 3.0))]
    pub safety_margin: f32,
    #[validate(range(min = 1, max = 16))]
    pub max_concurrent: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_comments: 25,
            base_overhead_tokens: 600,
            per_comment_overhead_tokens: 12,
            safety_margin: 1.3,
            max_concurrent: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetrySettings {
    /// Total attempts per batch, the first one included.
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter, as a fraction of the delay.
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter_ratio: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitSettings {
    #[validate(range(min = 1))]
    pub requests_per_minute: usize,
    /// How long a batch may wait for a slot before giving up.
    pub max_wait_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 50,
            max_wait_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheSettings {
    #[validate(range(min = 1, max = 2_592_000))]
    pub ttl_secs: u64,
    #[validate(range(min = 1))]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_entries: 5000,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineSettings {
    /// Comments with fewer words are rejected during normalization.
    #[validate(range(min = 1))]
    pub min_words: usize,
    pub max_theme_examples: usize,
    /// Hard deadline for a whole run; AI work stops once it passes.
    pub run_deadline_secs: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_words: 3,
            max_theme_examples: 3,
            run_deadline_secs: None,
        }
    }
}

/// Weights and thresholds of the churn, urgency and NPS heuristics.
///
/// These are policy, not contract: tune them per deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScoringPolicy {
    /// Confidence at or above which a negative verdict counts as strong.
    #[validate(range(min = 0.0, max = 1.0))]
    pub strong_negative_confidence: f32,
    /// Anger/frustration intensity at or above which a negative verdict counts as strong.
    #[validate(range(min = 0.0, max = 1.0))]
    pub strong_emotion_intensity: f32,
    pub churn_high_indicator_weight: u32,
    pub churn_medium_indicator_weight: u32,
    pub churn_negative_sentiment_weight: u32,
    pub churn_emotion_weight: u32,
    pub churn_high_threshold: u32,
    pub churn_medium_threshold: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            strong_negative_confidence: 0.8,
            strong_emotion_intensity: 0.5,
            churn_high_indicator_weight: 3,
            churn_medium_indicator_weight: 2,
            churn_negative_sentiment_weight: 1,
            churn_emotion_weight: 1,
            churn_high_threshold: 4,
            churn_medium_threshold: 2,
        }
    }
}

/// Everything a run needs to know, grouped by concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AnalysisConfig {
    #[validate(nested)]
    pub llm: LlmSettings,
    #[validate(nested)]
    pub batch: BatchSettings,
    #[validate(nested)]
    pub retry: RetrySettings,
    #[validate(nested)]
    pub rate_limit: RateLimitSettings,
    #[validate(nested)]
    pub cache: CacheSettings,
    #[validate(nested)]
    pub pipeline: PipelineSettings,
    #[validate(nested)]
    pub scoring: ScoringPolicy,
}

impl AnalysisConfig {
    /// Loads `.env` (if any), reads `FEEDBACK_*` variables and validates the result.
    pub fn from_env() -> Result<Self, AppError> {
        if dotenv::dotenv().is_ok() {
            info!("Loaded environment overrides from .env");
        }
        Self::from_current_env()
    }

    /// Same as [`AnalysisConfig::from_env`] without touching `.env`.
    pub fn from_current_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        config.llm.api_key = env_string("LLM_API_KEY");
        if let Some(url) = env_string("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = env_string("LLM_MODEL") {
            config.llm.model = model;
        }
        env_parse("LLM_MAX_TOKENS", &mut config.llm.max_tokens)?;
        env_parse("LLM_TEMPERATURE", &mut config.llm.temperature)?;
        env_parse("LLM_CONTEXT_LIMIT", &mut config.llm.context_limit)?;
        env_parse("LLM_TIMEOUT_SECS", &mut config.llm.request_timeout_secs)?;

        env_parse("BATCH_MAX_COMMENTS", &mut config.batch.max_comments)?;
        env_parse("MAX_CONCURRENT_BATCHES", &mut config.batch.max_concurrent)?;

        env_parse("RETRY_MAX_ATTEMPTS", &mut config.retry.max_attempts)?;
        env_parse("RETRY_BASE_DELAY_MS", &mut config.retry.base_delay_ms)?;
        env_parse("RETRY_MAX_DELAY_MS", &mut config.retry.max_delay_ms)?;

        env_parse("RATE_LIMIT_RPM", &mut config.rate_limit.requests_per_minute)?;
        env_parse("RATE_LIMIT_MAX_WAIT_MS", &mut config.rate_limit.max_wait_ms)?;

        env_parse("CACHE_TTL_SECS", &mut config.cache.ttl_secs)?;
        env_parse("CACHE_MAX_ENTRIES", &mut config.cache.max_entries)?;

        env_parse("MIN_WORDS", &mut config.pipeline.min_words)?;
        env_parse("MAX_THEME_EXAMPLES", &mut config.pipeline.max_theme_examples)?;
        if let Some(raw) = env_string("RUN_DEADLINE_SECS") {
            let secs = raw.parse::<u64>().map_err(|e| {
                AppError::Config(format!("{}RUN_DEADLINE_SECS={:?}: {}", ENV_PREFIX, raw, e))
            })?;
            config.pipeline.run_deadline_secs = Some(secs);
        }

        config.validate()?;

        if !config.llm.has_credentials() {
            warn!("{}LLM_API_KEY is not set; analysis will use rule-based mode only", ENV_PREFIX);
        }

        Ok(config)
    }

    /// A configuration with a key set, for wiring a backend in code.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.llm.api_key = Some(key.into());
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str, slot: &mut T) -> Result<(), AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = env_string(name) {
        *slot = raw
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{}{}={:?}: {}", ENV_PREFIX, name, raw, e)))?;
    }
    Ok(())
}
