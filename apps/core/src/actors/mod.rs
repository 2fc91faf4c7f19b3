//! Actor owning the HTTP connection to the external completion service.

pub mod llm;
pub mod messages;
pub mod traits;

pub use llm::LlmActorHandle;
pub use messages::CompletionRequest;
pub use traits::CompletionBackend;
