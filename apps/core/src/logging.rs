//! Tracing subscriber setup for the binary.

use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::AppError;

const DEFAULT_FILTER: &str = "info";

/// Output flavour of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Compact,
    /// Bunyan-style JSON, one object per line.
    Json,
}

impl LogFormat {
    /// Reads `FEEDBACK_LOG_FORMAT`; anything but `json` means compact.
    pub fn from_env() -> Self {
        match std::env::var("FEEDBACK_LOG_FORMAT") {
            Ok(value) if value.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// reserved for the report.
pub fn init_tracing(format: LogFormat) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new(
                env!("CARGO_PKG_NAME").to_string(),
                std::io::stderr,
            ))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| AppError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_env() {
        temp_env::with_var("FEEDBACK_LOG_FORMAT", Some("JSON"), || {
            assert_eq!(LogFormat::from_env(), LogFormat::Json);
        });
        temp_env::with_var("FEEDBACK_LOG_FORMAT", None::<&str>, || {
            assert_eq!(LogFormat::from_env(), LogFormat::Compact);
        });
    }
}
