//! Prompt construction and response parsing for batch analysis.
//!
//! The service is asked for `{"results": [...]}` with one element per
//! comment. Parsing is element by element: a bad element only fails its own
//! comment, never the batch.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::brain::{Language, ScoringRubric};
use crate::models::{AnalysisResult, Comment, ResultSource, Sentiment, Urgency};

/// Used when the service omits a confidence value.
pub const AI_DEFAULT_CONFIDENCE: f32 = 0.7;
/// Intensity given to emotions the service lists without a number.
const LISTED_EMOTION_INTENSITY: f32 = 0.5;

pub const SYSTEM_PROMPT: &str = "You are a customer feedback analyst for a telecommunications company. \
You classify each comment independently and answer with JSON only, no prose.";

/// Builds the user prompt for one batch.
pub fn build_prompt(comments: &[Comment], language: Language) -> String {
    let items: Vec<Value> = comments
        .iter()
        .map(|c| serde_json::json!({ "id": c.id, "text": c.normalized_text }))
        .collect();
    let payload = Value::Array(items).to_string();

    format!(
        "Analyze the following customer comments (language: {language}).\n\
         Return a JSON object {{\"results\": [...]}} with exactly one element per comment, each shaped as:\n\
         {{\"id\": <comment id>, \"sentiment\": \"positive\"|\"negative\"|\"neutral\", \"confidence\": 0.0-1.0, \
         \"emotions\": {{\"<emotion>\": 0.0-1.0}}, \"themes\": [\"<theme>\"], \"pain_points\": [\"<pain point>\"], \
         \"nps_score\": 0-10, \"urgency\": \"P0\"|\"P1\"|\"P2\"|\"P3\"}}\n\
         Use snake_case English names for emotions, themes and pain points. \
         Reserve P0 for strongly negative comments about a service outage or a billing error.\n\
         Comments: {payload}",
        language = language.code(),
        payload = payload,
    )
}

/// One element of the service's answer, as loosely as it may arrive.
#[derive(Debug, Deserialize)]
struct AiElement {
    #[serde(default)]
    id: Option<Value>,
    sentiment: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    emotions: Option<Value>,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default, alias = "painPoints")]
    pain_points: Vec<String>,
    #[serde(default, alias = "npsScore")]
    nps_score: Option<f64>,
    #[serde(default)]
    urgency: Option<String>,
}

/// Parsed answer for one batch.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    /// AI verdicts for the comments that parsed, tagged `source = AI`.
    pub results: Vec<AnalysisResult>,
    /// Ids of comments without a usable verdict.
    pub failed: Vec<usize>,
}

/// Parses the service's raw text against the batch that was sent.
pub fn parse_response(raw: &str, batch: &[Comment], rubric: &ScoringRubric) -> ParsedBatch {
    let Some(elements) = extract_elements(raw) else {
        warn!(
            batch_size = batch.len(),
            preview = %raw.chars().take(200).collect::<String>(),
            "No JSON array found in service response"
        );
        return ParsedBatch {
            results: Vec::new(),
            failed: batch.iter().map(|c| c.id).collect(),
        };
    };

    let expected: HashSet<usize> = batch.iter().map(|c| c.id).collect();
    let mut taken: HashMap<usize, AnalysisResult> = HashMap::new();

    for (position, element) in elements.into_iter().enumerate() {
        let parsed = match serde_json::from_value::<AiElement>(element) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(position, error = %e, "Skipping unparseable element");
                continue;
            }
        };

        let comment_id = match parsed.id.as_ref().and_then(value_as_id) {
            Some(id) => id,
            None if parsed.id.is_none() => match batch.get(position) {
                Some(comment) => comment.id,
                None => continue,
            },
            None => continue,
        };
        if !expected.contains(&comment_id) || taken.contains_key(&comment_id) {
            debug!(comment_id, "Skipping element with unknown or repeated id");
            continue;
        }

        if let Some(result) = into_result(comment_id, parsed, rubric) {
            taken.insert(comment_id, result);
        }
    }

    let mut parsed = ParsedBatch::default();
    for comment in batch {
        match taken.remove(&comment.id) {
            Some(result) => parsed.results.push(result),
            None => parsed.failed.push(comment.id),
        }
    }
    parsed
}

fn into_result(comment_id: usize, element: AiElement, rubric: &ScoringRubric) -> Option<AnalysisResult> {
    let sentiment = Sentiment::from_label(&element.sentiment)?;
    let confidence = match element.confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        Some(_) => return None,
        None => AI_DEFAULT_CONFIDENCE,
    };

    let mut result = AnalysisResult {
        comment_id,
        sentiment,
        confidence,
        emotions: element.emotions.map(parse_emotions).unwrap_or_default(),
        themes: clean_labels(element.themes),
        pain_points: clean_labels(element.pain_points),
        nps_score: element
            .nps_score
            .filter(|s| s.is_finite() && (0.0..=10.0).contains(s))
            .map(|s| s.round() as u8),
        urgency: Urgency::P3,
        source: ResultSource::Ai,
    };
    let proposed = element.urgency.as_deref().and_then(Urgency::from_label);
    result.urgency = rubric.reconcile_urgency(proposed, &result);
    Some(result)
}

/// Accepts `{"anger": 0.8}` or `["anger", "worry"]`.
fn parse_emotions(value: Value) -> BTreeMap<String, f32> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(name, v)| {
                let intensity = v.as_f64()? as f32;
                intensity
                    .is_finite()
                    .then(|| (normalize_label(&name), intensity.clamp(0.0, 1.0)))
            })
            .filter(|(name, _)| !name.is_empty())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(normalize_label)
            .filter(|name| !name.is_empty())
            .map(|name| (name, LISTED_EMOTION_INTENSITY))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn clean_labels(labels: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = normalize_label(&label);
        if !label.is_empty() && !cleaned.contains(&label) {
            cleaned.push(label);
        }
    }
    cleaned
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn value_as_id(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Finds the result array in whatever the service wrapped it in.
fn extract_elements(raw: &str) -> Option<Vec<Value>> {
    let text = strip_code_fence(raw.trim());

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(elements) = array_in(value) {
            return Some(elements);
        }
    }

    // Prose around the payload: try the outermost object, then the outermost array.
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                    if let Some(elements) = array_in(value) {
                        return Some(elements);
                    }
                }
            }
        }
    }
    None
}

fn array_in(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            for key in ["results", "analyses", "comments", "data"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Some(items);
                }
            }
            map.into_iter().find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
        }
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
