use std::io;
use std::time::Duration;
use thiserror::Error;

/// Application-wide error type, consolidating all possible errors into a single enum.
#[derive(Debug, Error)]
pub enum AppError {
    /// Represents standard input/output errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Represents failures talking to the external completion service.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Represents data validation errors (e.g., invalid input format).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Represents configuration-related errors (e.g., malformed environment variables).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Represents unexpected internal errors that indicate a bug.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Represents errors from operations that did not complete in time.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Represents an error indicating that a rate limit has been exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The analysis run was cancelled or hit its deadline.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Failures of a single request against the external completion service.
///
/// The variants drive the retry loop and the orchestrator state machine:
/// transient failures are retried, everything else is not.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// 5xx responses and other server-side hiccups.
    #[error("transient service failure: {0}")]
    Transient(String),

    /// HTTP 429. Carries the server's `Retry-After` hint when present.
    #[error("rate limited by service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, DNS failure and the like.
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// Missing or rejected credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service refused the request as malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request cancelled")]
    Cancelled,

    /// The actor task owning the HTTP client is gone.
    #[error("completion actor unavailable: {0}")]
    ActorUnavailable(String),
}

impl ServiceError {
    /// Whether the retry loop may try the same request again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Transient(_)
                | ServiceError::RateLimited { .. }
                | ServiceError::Timeout(_)
                | ServiceError::Unreachable(_)
        )
    }

    /// Credential problems cannot be fixed by the next batch either.
    pub fn is_auth(&self) -> bool {
        matches!(self, ServiceError::Auth(_))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(format!("Operation timed out: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Config(format!("Validation errors: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Service(ServiceError::from(err))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            ServiceError::Unreachable(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ServiceError::Transient(format!("unreadable response body: {}", err))
        } else if err.is_builder() {
            ServiceError::BadRequest(err.to_string())
        } else {
            ServiceError::Transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Transient("502".into()).is_transient());
        assert!(ServiceError::RateLimited { retry_after: None }.is_transient());
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ServiceError::Unreachable("refused".into()).is_transient());

        assert!(!ServiceError::Auth("401".into()).is_transient());
        assert!(!ServiceError::BadRequest("400".into()).is_transient());
        assert!(!ServiceError::Cancelled.is_transient());
    }

    #[test]
    fn test_service_error_wraps_into_app_error() {
        let err: AppError = ServiceError::Auth("invalid key".into()).into();
        assert!(matches!(err, AppError::Service(ServiceError::Auth(_))));
        assert!(err.to_string().contains("invalid key"));
    }
}
