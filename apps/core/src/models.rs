use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Overall polarity of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Parses the labels an LLM tends to produce, in English or Spanish.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" | "positivo" | "positiva" | "pos" => Some(Sentiment::Positive),
            "negative" | "negativo" | "negativa" | "neg" => Some(Sentiment::Negative),
            "neutral" | "neutro" | "neu" | "mixed" | "mixto" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// Response priority, `P0` being the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    P0,
    P1,
    P2,
    P3,
}

impl Urgency {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "P0" | "CRITICAL" => Some(Urgency::P0),
            "P1" | "HIGH" => Some(Urgency::P1),
            "P2" | "MEDIUM" => Some(Urgency::P2),
            "P3" | "LOW" => Some(Urgency::P3),
            _ => None,
        }
    }
}

/// Which analyzer produced a per-comment result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultSource {
    Ai,
    Rule,
    /// AI polarity completed with rule-derived themes and pain points.
    Hybrid,
}

impl ResultSource {
    /// AI and hybrid results both carry an AI verdict on sentiment.
    pub fn is_ai_resolved(&self) -> bool {
        matches!(self, ResultSource::Ai | ResultSource::Hybrid)
    }
}

/// Terminal mode of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisMethod {
    AiPowered,
    HybridAiRule,
    RuleBasedFallback,
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalysisMethod::AiPowered => "AI_POWERED",
            AnalysisMethod::HybridAiRule => "HYBRID_AI_RULE",
            AnalysisMethod::RuleBasedFallback => "RULE_BASED_FALLBACK",
        };
        f.write_str(label)
    }
}

/// One raw comment as handed over by the ingestion collaborator.
///
/// `text` is kept as a JSON value because spreadsheets routinely hand over
/// numbers, booleans or nulls in a text column; anything that is not a
/// string is dropped during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawComment {
    pub text: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RawComment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: serde_json::Value::String(text.into()),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.metadata
            .insert("rating".to_string(), serde_json::Value::from(rating));
        self
    }
}

/// Input contract of one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub comments: Vec<RawComment>,
    /// Language hint (`es`, `en`, ...). Detected from the text when absent.
    #[serde(default)]
    pub language: Option<String>,
}

impl AnalysisRequest {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            comments: texts.into_iter().map(RawComment::new).collect(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A normalized, deduplicated comment. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    /// Position in the normalized list; results are reported in this order.
    pub id: usize,
    pub raw_text: String,
    pub normalized_text: String,
    /// How many raw comments collapsed into this one.
    pub frequency: usize,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Comment {
    /// Explicit 0-10 rating supplied with the comment, if any.
    pub fn rating(&self) -> Option<u8> {
        let value = self.metadata.get("rating")?;
        let rating = match value {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if (0.0..=10.0).contains(&rating) {
            Some(rating.round() as u8)
        } else {
            None
        }
    }
}

/// Per-comment analysis, whatever produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub comment_id: usize,
    pub sentiment: Sentiment,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub emotions: BTreeMap<String, f32>,
    pub themes: Vec<String>,
    pub pain_points: Vec<String>,
    pub nps_score: Option<u8>,
    pub urgency: Urgency,
    pub source: ResultSource,
}

impl AnalysisResult {
    /// The "unknown" verdict: neutral with zero confidence.
    pub fn unknown(comment_id: usize, source: ResultSource) -> Self {
        Self {
            comment_id,
            sentiment: Sentiment::Neutral,
            confidence: 0.0,
            emotions: BTreeMap::new(),
            themes: Vec::new(),
            pain_points: Vec::new(),
            nps_score: None,
            urgency: Urgency::P3,
            source,
        }
    }

    /// Strongest intensity among the given emotions.
    pub fn max_emotion(&self, names: &[&str]) -> f32 {
        names
            .iter()
            .filter_map(|name| self.emotions.get(*name))
            .copied()
            .fold(0.0, f32::max)
    }
}

/// A comment together with its final verdict.
#[derive(Debug, Clone, Serialize)]
pub struct CommentAnalysis {
    pub comment: Comment,
    pub result: AnalysisResult,
}

/// Work unit sent to the completion service.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Index of the batch within its run, for logs.
    pub index: usize,
    pub comments: Vec<Comment>,
    pub mode: BatchMode,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Ai,
    Hybrid,
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Warning,
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Surfaced to the caller whenever the run degraded from what was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub severity: Severity,
}

impl ServiceNotification {
    pub fn warning(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: NotificationKind::Warning,
            message: message.into(),
            severity,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            message: message.into(),
            severity: Severity::Low,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
            severity: Severity::High,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: CategoryShare,
    pub neutral: CategoryShare,
    pub negative: CategoryShare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NpsBasis {
    /// Every comment carried an explicit rating.
    Explicit,
    /// No comment carried a rating; scores were derived from sentiment.
    Synthetic,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpsSummary {
    /// Always within `[-100, 100]`.
    pub score: f64,
    pub promoters: usize,
    pub detractors: usize,
    pub passives: usize,
    pub basis: NpsBasis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnAnalysis {
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyDistribution {
    #[serde(rename = "P0")]
    pub p0: usize,
    #[serde(rename = "P1")]
    pub p1: usize,
    #[serde(rename = "P2")]
    pub p2: usize,
    #[serde(rename = "P3")]
    pub p3: usize,
}

impl UrgencyDistribution {
    pub fn record(&mut self, urgency: Urgency, weight: usize) {
        match urgency {
            Urgency::P0 => self.p0 += weight,
            Urgency::P1 => self.p1 += weight,
            Urgency::P2 => self.p2 += weight,
            Urgency::P3 => self.p3 += weight,
        }
    }
}

/// Output contract handed to the reporting/export collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub run_id: String,
    /// Raw comment count after deduplication weights are applied.
    pub total: usize,
    pub unique_comments: usize,
    pub rejected_comments: usize,
    #[serde(rename = "sentimentDistribution")]
    pub sentiment_distribution: SentimentDistribution,
    /// Ordered by descending count.
    #[serde(serialize_with = "ordered_map")]
    pub theme_counts: Vec<(String, usize)>,
    pub theme_examples: BTreeMap<String, Vec<String>>,
    #[serde(serialize_with = "ordered_map")]
    pub pain_point_counts: Vec<(String, usize)>,
    pub nps: NpsSummary,
    pub churn_analysis: ChurnAnalysis,
    pub urgency_distribution: UrgencyDistribution,
    /// Ordered by descending intensity.
    #[serde(serialize_with = "ordered_map")]
    pub emotion_summary: Vec<(String, f32)>,
    pub analysis_method: AnalysisMethod,
    pub ai_coverage_pct: f64,
    pub service_notifications: Vec<ServiceNotification>,
    /// Per-comment verdicts in input order.
    pub results: Vec<CommentAnalysis>,
}

impl AnalysisReport {
    pub fn theme_count(&self, theme: &str) -> usize {
        self.theme_counts
            .iter()
            .find(|(name, _)| name == theme)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Reported instead of a result when the input cannot be analyzed at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub reason: String,
    pub received: usize,
    pub rejected: usize,
}

/// What one analysis run hands back to its caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
#[allow(clippy::large_enum_variant)]
pub enum AnalysisOutcome {
    Completed(AnalysisReport),
    Rejected(ValidationReport),
}

impl AnalysisOutcome {
    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisOutcome::Completed(report) => Some(report),
            AnalysisOutcome::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, AnalysisOutcome::Rejected(_))
    }
}

/// Serializes an ordered list of pairs as a JSON object, keeping the order.
fn ordered_map<K, V, S>(entries: &[(K, V)], serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    V: Serialize,
    S: Serializer,
{
    serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
}
