// feedback-core command line entry point.
// Reads comments from a file, runs one analysis and prints the report as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use feedback_core::logging::{init_tracing, LogFormat};
use feedback_core::{AnalysisConfig, AnalysisOrchestrator, AnalysisOutcome, AnalysisRequest, RawComment};

/// Exit code for input that could not be analyzed at all.
const EXIT_REJECTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "feedback-core")]
#[command(about = "Analyze customer feedback comments", long_about = None)]
#[command(version)]
struct Args {
    /// JSON array of comments (strings or objects with a `text` field), or
    /// plain text with one comment per line
    input: PathBuf,

    /// Language hint for the comments (es, en, ...); detected when absent
    #[arg(short, long, env = "FEEDBACK_LANGUAGE")]
    language: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing(LogFormat::from_env())?;
    let args = Args::parse();

    let config = AnalysisConfig::from_env()?;
    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let comments = parse_input(&raw);
    info!(path = %args.input.display(), comments = comments.len(), "Input loaded");

    let mut request = AnalysisRequest {
        comments,
        language: None,
    };
    if let Some(language) = args.language {
        request = request.with_language(language);
    }

    let orchestrator = AnalysisOrchestrator::from_config(config)?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with rule-based analysis");
            on_interrupt.cancel();
        }
    });

    let outcome = orchestrator.analyze_with_cancel(request, cancel).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(match outcome {
        AnalysisOutcome::Completed(_) => ExitCode::SUCCESS,
        AnalysisOutcome::Rejected(_) => ExitCode::from(EXIT_REJECTED),
    })
}

/// A JSON array when the file holds one, otherwise one comment per non-blank line.
fn parse_input(raw: &str) -> Vec<RawComment> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items.into_iter().map(raw_comment).collect(),
        _ => raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(RawComment::new)
            .collect(),
    }
}

/// Objects carry their text under `text` (or `comment`); every other field
/// becomes metadata.
fn raw_comment(item: Value) -> RawComment {
    match item {
        Value::Object(mut fields) => {
            let text = fields
                .remove("text")
                .or_else(|| fields.remove("comment"))
                .unwrap_or(Value::Null);
            RawComment { text, metadata: fields }
        }
        other => RawComment {
            text: other,
            metadata: serde_json::Map::new(),
        },
    }
}
