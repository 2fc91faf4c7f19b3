use crate::actors::messages::{CompletionRequest, LlmMessage};
use crate::actors::traits::CompletionBackend;
use crate::config::LlmSettings;
use crate::error::{AppError, ServiceError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Extra time the handle waits past the HTTP timeout before giving up on the actor.
const RESPONDER_GRACE: Duration = Duration::from_secs(5);

/// A handle to the LLM actor.
///
/// This struct provides a public, cloneable interface for sending messages to the
/// running LLM actor. It abstracts away the `mpsc::Sender`.
#[derive(Clone)]
pub struct LlmActorHandle {
    sender: mpsc::Sender<LlmMessage>,
    request_timeout: Duration,
}

impl LlmActorHandle {
    /// Creates a new LLM actor and returns a handle to it.
    ///
    /// This will spawn the `LlmActorRunner` in a new Tokio task. Fails only if
    /// the HTTP client cannot be built from the settings.
    pub fn new(settings: &LlmSettings) -> Result<Self, AppError> {
        let (sender, receiver) = mpsc::channel(32);
        let backend = HttpCompletion::new(settings)?;
        let actor = LlmActorRunner::new(receiver, backend);
        tokio::spawn(async move { actor.run().await });
        Ok(Self {
            sender,
            request_timeout: settings.request_timeout(),
        })
    }
}

#[async_trait]
impl CompletionBackend for LlmActorHandle {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        let (send, recv) = oneshot::channel();
        let msg = LlmMessage::Complete {
            request,
            responder: send,
        };

        self.sender
            .send(msg)
            .await
            .map_err(|e| ServiceError::ActorUnavailable(e.to_string()))?;
        timeout(self.request_timeout + RESPONDER_GRACE, recv)
            .await
            .map_err(|_| ServiceError::Timeout(self.request_timeout))?
            .map_err(|e| ServiceError::ActorUnavailable(e.to_string()))?
    }
}

// --- Actor Runner (Internal Logic) ---
struct LlmActorRunner {
    receiver: mpsc::Receiver<LlmMessage>,
    backend: Arc<HttpCompletion>,
}

impl LlmActorRunner {
    fn new(receiver: mpsc::Receiver<LlmMessage>, backend: HttpCompletion) -> Self {
        Self {
            receiver,
            backend: Arc::new(backend),
        }
    }

    async fn run(mut self) {
        info!(endpoint = %self.backend.endpoint, model = %self.backend.model, "LLM actor started");

        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg);
        }

        info!("LLM actor stopped");
    }

    /// Each request runs on its own task so concurrent batches are not
    /// serialized behind one another.
    fn handle_message(&self, msg: LlmMessage) {
        match msg {
            LlmMessage::Complete { request, responder } => {
                let backend = Arc::clone(&self.backend);
                tokio::spawn(async move {
                    let result = backend.chat_completion(&request).await;
                    let _ = responder.send(result);
                });
            }
        }
    }
}

/// OpenAI-compatible `chat/completions` client.
struct HttpCompletion {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpCompletion {
    fn new(settings: &LlmSettings) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            request_timeout: settings.request_timeout(),
        })
    }

    fn headers(&self) -> Result<HeaderMap, ServiceError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| ServiceError::Auth("API key contains invalid header characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn chat_completion(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        debug!(prompt_chars = request.prompt.len(), "Sending completion request");

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let res = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = res.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(res.headers());
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Completion request rejected");
            return Err(classify_status(status, body, retry_after));
        }

        let response: ChatResponse = res.json().await.map_err(|e| self.transport_error(e))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::Transient("response carried no completion content".into()))
    }

    fn transport_error(&self, err: reqwest::Error) -> ServiceError {
        match ServiceError::from(err) {
            ServiceError::Timeout(_) => ServiceError::Timeout(self.request_timeout),
            other => other,
        }
    }
}

/// Maps a non-success HTTP status to the service error taxonomy.
fn classify_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> ServiceError {
    let detail = format!("status {}: {}", status.as_u16(), body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited { retry_after },
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => ServiceError::BadRequest(detail),
        s if s.is_server_error() => ServiceError::Transient(detail),
        StatusCode::REQUEST_TIMEOUT => ServiceError::Transient(detail),
        _ => ServiceError::BadRequest(detail),
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String) -> LlmSettings {
        LlmSettings {
            api_key: Some("test-key".into()),
            base_url,
            request_timeout_secs: 1,
            ..Default::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You analyze feedback.".into(),
            prompt: "[]".into(),
            temperature: 0.2,
            max_tokens: 100,
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_completion_success() {
        // 1. Arrange
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(&settings(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-key"))
            .and(body_partial_json(json!({ "model": "gpt-4o-mini", "max_tokens": 100 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("{\"results\": []}")))
            .expect(1)
            .mount(&mock_server)
            .await;

        // 2. Act
        let result = handle.complete(request()).await;

        // 3. Assert
        assert_eq!(result.unwrap(), "{\"results\": []}");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(&settings(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let err = handle.complete(request()).await.unwrap_err();
        assert!(err.is_transient());
        if let ServiceError::Transient(msg) = err {
            assert!(msg.contains("503"));
            assert!(msg.contains("overloaded"));
        } else {
            panic!("Expected ServiceError::Transient, got something else.");
        }
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(&settings(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&mock_server)
            .await;

        let err = handle.complete(request()).await.unwrap_err();
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after() {
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(&settings(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&mock_server)
            .await;

        let err = handle.complete(request()).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[tokio::test]
    async fn test_unprocessable_is_bad_request() {
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(&settings(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("context length exceeded"))
            .mount(&mock_server)
            .await;

        let err = handle.complete(request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_content_is_transient() {
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(&settings(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        let err = handle.complete(request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transient(_)));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(&settings(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_body("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let err = handle.complete(request()).await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Nothing listens on port 1.
        let handle = LlmActorHandle::new(&settings("http://127.0.0.1:1".into())).unwrap();

        let err = handle.complete(request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unreachable(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}
