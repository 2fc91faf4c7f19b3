use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::ServiceError;

/// One prompt for the completion service.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Messages that can be sent to the LLM actor.
#[derive(Debug)]
pub enum LlmMessage {
    /// A request to generate a complete text response.
    Complete {
        request: CompletionRequest,
        /// A channel to send the final `String` result back.
        responder: oneshot::Sender<Result<String, ServiceError>>,
    },
}
