//! Chaos Tests
//!
//! Cancellation, deadlines, rate-limit starvation and concurrent runs
//! over shared state. None of these may panic or lose a comment.

use crate::actors::CompletionBackend;
use crate::cache::{ResponseCache, SharedCache};
use crate::config::AnalysisConfig;
use crate::models::{AnalysisMethod, AnalysisOutcome, AnalysisReport, AnalysisRequest, ResultSource};
use crate::pipeline::AnalysisOrchestrator;
use crate::rate_limiter::{RateLimiter, SharedRateLimiter};
use crate::tests::mocks::ScriptedBackend;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// --- Fixtures ---

fn fast_retry_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default().with_api_key("chaos-key");
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config
}

fn completed(outcome: AnalysisOutcome) -> AnalysisReport {
    match outcome {
        AnalysisOutcome::Completed(report) => report,
        AnalysisOutcome::Rejected(rejection) => panic!("unexpected rejection: {}", rejection.reason),
    }
}

fn comments(prefix: &str, n: usize) -> AnalysisRequest {
    AnalysisRequest::from_texts((0..n).map(|i| format!("{} numero {} sobre el servicio de internet", prefix, i)))
        .with_language("es")
}

fn assert_one_result_per_comment(report: &AnalysisReport) {
    for (index, analysis) in report.results.iter().enumerate() {
        assert_eq!(analysis.comment.id, index);
        assert_eq!(analysis.result.comment_id, index);
    }
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let backend = Arc::new(ScriptedBackend::echo());
    let dyn_backend: Arc<dyn CompletionBackend> = backend.clone();
    let orchestrator = AnalysisOrchestrator::with_backend(fast_retry_config(), Some(dyn_backend));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = completed(orchestrator.analyze_with_cancel(comments("cancelado", 6), cancel).await);

    assert_eq!(backend.calls(), 0);
    assert_eq!(report.analysis_method, AnalysisMethod::RuleBasedFallback);
    assert_eq!(report.results.len(), 6);
    assert!(report.results.iter().all(|a| a.result.source == ResultSource::Rule));
    assert!(report
        .service_notifications
        .iter()
        .any(|n| n.message.contains("cancelled")));
    assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_run_falls_back() {
    let backend = Arc::new(ScriptedBackend::echo().with_delay(Duration::from_secs(5)));
    let dyn_backend: Arc<dyn CompletionBackend> = backend.clone();
    let orchestrator = AnalysisOrchestrator::with_backend(fast_retry_config(), Some(dyn_backend));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let report = completed(orchestrator.analyze_with_cancel(comments("interrumpido", 4), cancel).await);

    assert!(start.elapsed() < Duration::from_secs(3), "Cancellation was not honoured: {:?}", start.elapsed());
    assert_eq!(report.analysis_method, AnalysisMethod::RuleBasedFallback);
    assert_eq!(report.results.len(), 4);
    assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn test_run_deadline_bounds_a_slow_service() {
    let mut config = fast_retry_config();
    config.pipeline.run_deadline_secs = Some(1);
    let backend = Arc::new(ScriptedBackend::echo().with_delay(Duration::from_secs(3)));
    let dyn_backend: Arc<dyn CompletionBackend> = backend.clone();
    let orchestrator = AnalysisOrchestrator::with_backend(config, Some(dyn_backend));

    let start = Instant::now();
    let report = completed(orchestrator.analyze(comments("lento", 5)).await);

    assert!(start.elapsed() < Duration::from_millis(2500), "Deadline ignored: {:?}", start.elapsed());
    assert_eq!(report.analysis_method, AnalysisMethod::RuleBasedFallback);
    assert_eq!(report.ai_coverage_pct, 0.0);
    assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_share_cache_and_limiter() {
    let config = fast_retry_config();
    let backend = Arc::new(ScriptedBackend::echo().with_delay(Duration::from_millis(50)));
    let cache = SharedCache::new(ResponseCache::from_settings(&config.cache));
    let limiter = SharedRateLimiter::new(RateLimiter::per_minute(1_000), Duration::from_secs(1));

    let mut handles = vec![];
    for run in 0..8 {
        let dyn_backend: Arc<dyn CompletionBackend> = backend.clone();
        let orchestrator =
            AnalysisOrchestrator::with_shared(config.clone(), Some(dyn_backend), cache.clone(), limiter.clone());
        handles.push(tokio::spawn(async move {
            let report = completed(orchestrator.analyze(comments(&format!("corrida {}", run % 2), 5)).await);
            assert_eq!(report.analysis_method, AnalysisMethod::AiPowered, "Run {} degraded", run);
            assert_one_result_per_comment(&report);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Two distinct inputs of five comments each.
    assert_eq!(cache.len(), 10);
    assert!(backend.calls() >= 2);
}

#[tokio::test]
async fn test_starved_rate_limit_degrades_without_panicking() {
    let mut config = fast_retry_config();
    config.batch.max_comments = 2;
    config.batch.max_concurrent = 1;
    config.rate_limit.requests_per_minute = 1;
    config.rate_limit.max_wait_ms = 10;
    let backend = Arc::new(ScriptedBackend::echo());
    let dyn_backend: Arc<dyn CompletionBackend> = backend.clone();
    let orchestrator = AnalysisOrchestrator::with_backend(config, Some(dyn_backend));

    let report = completed(orchestrator.analyze(comments("limitado", 6)).await);

    assert_eq!(backend.calls(), 1);
    assert_eq!(report.analysis_method, AnalysisMethod::HybridAiRule);
    assert_eq!(report.ai_coverage_pct, 33.3);
    assert_one_result_per_comment(&report);
}

#[tokio::test]
async fn test_high_concurrency_keeps_input_order() {
    let mut config = fast_retry_config();
    config.batch.max_comments = 3;
    config.batch.max_concurrent = 8;
    let backend = Arc::new(ScriptedBackend::echo().with_delay(Duration::from_millis(30)));
    let dyn_backend: Arc<dyn CompletionBackend> = backend.clone();
    let orchestrator = AnalysisOrchestrator::with_backend(config, Some(dyn_backend));

    let start = Instant::now();
    let report = completed(orchestrator.analyze(comments("orden", 48)).await);
    let duration = start.elapsed();

    assert_eq!(backend.calls(), 16);
    assert_eq!(report.analysis_method, AnalysisMethod::AiPowered);
    assert_one_result_per_comment(&report);
    for (index, analysis) in report.results.iter().enumerate() {
        assert!(analysis.comment.raw_text.contains(&format!("numero {} ", index)));
    }
    // 16 batches of 30ms run sequentially would take ~480ms.
    assert!(duration < Duration::from_millis(400), "Batches ran sequentially: {:?}", duration);
}
