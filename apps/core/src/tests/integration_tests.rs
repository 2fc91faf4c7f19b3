//! Integration Tests
//!
//! End-to-end runs through the real HTTP actor against a mocked
//! OpenAI-compatible endpoint.

use crate::config::AnalysisConfig;
use crate::models::{
    AnalysisMethod, AnalysisOutcome, AnalysisReport, AnalysisRequest, NotificationKind, ResultSource,
    Sentiment,
};
use crate::pipeline::AnalysisOrchestrator;
use crate::tests::mocks::echo_reply;
use serde_json::{json, Value};
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Answers every chat request with verdicts for the comments in its prompt.
struct EchoResponder {
    limit: Option<usize>,
}

impl Respond for EchoResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": echo_reply(prompt, self.limit) },
                "finish_reason": "stop"
            }]
        }))
    }
}

fn config_for(server: &MockServer) -> AnalysisConfig {
    let mut config = AnalysisConfig::default().with_api_key("integration-key");
    config.llm.base_url = server.uri();
    config.llm.request_timeout_secs = 2;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 40;
    config
}

fn completed(outcome: AnalysisOutcome) -> AnalysisReport {
    match outcome {
        AnalysisOutcome::Completed(report) => report,
        AnalysisOutcome::Rejected(rejection) => panic!("unexpected rejection: {}", rejection.reason),
    }
}

fn request() -> AnalysisRequest {
    AnalysisRequest::from_texts([
        "Excelente servicio, lo recomiendo",
        "Internet muy lento no funciona",
        "La factura vino con doble cobro",
        "El técnico llegó tarde a la instalación",
    ])
    .with_language("es")
}

// ============================================================================
// Workflow Tests
// ============================================================================

#[cfg(test)]
mod workflow_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_ai_run_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("integration-key"))
            .respond_with(EchoResponder { limit: None })
            .expect(1)
            .mount(&server)
            .await;

        let orchestrator = AnalysisOrchestrator::from_config(config_for(&server)).unwrap();
        let report = completed(orchestrator.analyze(request()).await);

        assert_eq!(report.analysis_method, AnalysisMethod::AiPowered);
        assert_eq!(report.ai_coverage_pct, 100.0);
        assert_eq!(report.results.len(), 4);
        assert!(report.results.iter().all(|a| a.result.source == ResultSource::Ai));
        assert_eq!(report.theme_count("customer_service"), 4);
    }

    #[tokio::test]
    async fn test_partial_answer_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(EchoResponder { limit: Some(2) })
            .mount(&server)
            .await;

        let orchestrator = AnalysisOrchestrator::from_config(config_for(&server)).unwrap();
        let report = completed(orchestrator.analyze(request()).await);

        assert_eq!(report.analysis_method, AnalysisMethod::HybridAiRule);
        assert_eq!(report.ai_coverage_pct, 50.0);
        assert_eq!(report.results[2].result.source, ResultSource::Rule);
        assert!(report.results[2].result.themes.contains(&"billing".to_string()));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let orchestrator = AnalysisOrchestrator::from_config(config_for(&server)).unwrap();
        let report = completed(orchestrator.analyze(request()).await);

        assert_eq!(report.analysis_method, AnalysisMethod::RuleBasedFallback);
        assert_eq!(report.ai_coverage_pct, 0.0);
        assert!(report.results.iter().all(|a| a.result.source == ResultSource::Rule));
        assert_eq!(report.results[1].result.sentiment, Sentiment::Negative);
    }

    #[tokio::test]
    async fn test_rejected_key_is_reported_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let orchestrator = AnalysisOrchestrator::from_config(config_for(&server)).unwrap();
        let report = completed(orchestrator.analyze(request()).await);

        let errors: Vec<_> = report
            .service_notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(report.analysis_method, AnalysisMethod::RuleBasedFallback);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(EchoResponder { limit: None })
            .mount(&server)
            .await;

        let orchestrator = AnalysisOrchestrator::from_config(config_for(&server)).unwrap();
        let report = completed(orchestrator.analyze(request()).await);

        assert_eq!(report.analysis_method, AnalysisMethod::AiPowered);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(EchoResponder { limit: None })
            .expect(1)
            .mount(&server)
            .await;

        let orchestrator = AnalysisOrchestrator::from_config(config_for(&server)).unwrap();
        let first = completed(orchestrator.analyze(request()).await);
        let second = completed(orchestrator.analyze(request()).await);

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(second.analysis_method, AnalysisMethod::AiPowered);
        assert_eq!(second.nps, first.nps);
    }

    #[tokio::test]
    async fn test_without_key_no_request_is_made() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(EchoResponder { limit: None })
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.llm.api_key = None;
        let orchestrator = AnalysisOrchestrator::from_config(config).unwrap();
        let report = completed(orchestrator.analyze(request()).await);

        assert_eq!(report.analysis_method, AnalysisMethod::RuleBasedFallback);
    }
}
