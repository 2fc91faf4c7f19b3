use crate::actors::messages::CompletionRequest;
use crate::error::ServiceError;
use async_trait::async_trait;

/// Defines the public interface of the external completion service.
///
/// This trait abstracts the specific implementation of the LLM, allowing for different
/// backends (e.g., a remote HTTP API, or a scripted mock in tests) to be used interchangeably.
#[async_trait]
pub trait CompletionBackend: Send + Sync + 'static {
    /// Sends one prompt and returns the raw text the model produced.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError>;
}
