//! Response normalizer.
//!
//! Turns the raw text reply of the generative model into an `AnalysisResult`.
//! The model is asked for bare JSON but sometimes wraps it in a markdown fence
//! or surrounds it with prose, so decoding runs an ordered chain of attempts:
//!
//! 1. `Direct`: the whole trimmed text.
//! 2. `Fenced`: the inner content of the first ```` ``` ```` block (optionally tagged `json`).
//! 3. `BraceSpan`: from the first `{` to the last `}`.
//!
//! The first attempt whose decoded value is an object exposing all three
//! narrative list keys wins. Acceptance is structural only: extra keys are
//! ignored and optional fields fall back to defaults. Visualization entries
//! that are malformed are dropped one by one and never fail the parse.

use crate::error::NormalizeError;
use crate::types::{
    AnalysisResult, ChartData, ChartKind, Point, PointSeries, ResultField, ValueSeries,
    Visualization,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Wire keys of the three required narrative lists.
pub const REQUIRED_LIST_KEYS: [(&str, ResultField); 3] = [
    ("Key Insights", ResultField::KeyInsights),
    ("Top Yield Impact Factors", ResultField::TopYieldImpactFactors),
    ("Optimization Suggestions", ResultField::OptimizationSuggestions),
];

/// Wire key of the optional predicted-yield text.
pub const PREDICTED_YIELD_KEY: &str = "Optional Predicted Yield (if inputs provided)";

/// Wire keys that may carry visualizations, in lookup order.
const VISUALIZATION_KEYS: [&str; 2] = ["Visualizations", "SuggestedVisualizations"];

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?i:json)?\s*\n?(.*?)\n?\s*```").expect("fence pattern is valid")
});

/// One strategy for locating the JSON object inside a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Direct,
    Fenced,
    BraceSpan,
}

/// The order in which attempts are tried.
pub const ATTEMPT_ORDER: [Attempt; 3] = [Attempt::Direct, Attempt::Fenced, Attempt::BraceSpan];

/// Why an attempt did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The attempt found nothing to decode (no fence, no brace span).
    NoCandidate,
    /// The candidate text is not valid JSON.
    InvalidJson(String),
    /// Decoded, but not an object with the required list keys.
    MissingFields(Vec<&'static str>),
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Accepted(AnalysisResult),
    Rejected(Rejection),
}

/// Record of one attempt made by `normalize_with_trace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTrace {
    pub attempt: Attempt,
    /// `None` when the attempt was accepted.
    pub rejection: Option<Rejection>,
}

/// Normalize a raw model reply into an `AnalysisResult`.
pub fn normalize(raw: &str) -> Result<AnalysisResult, NormalizeError> {
    normalize_with_trace(raw).0
}

/// Like [`normalize`], also returning what each attempt did.
pub fn normalize_with_trace(raw: &str) -> (Result<AnalysisResult, NormalizeError>, Vec<AttemptTrace>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        warn!("Model returned an empty response");
        return (Err(NormalizeError::EmptyResponse), Vec::new());
    }

    let mut trace = Vec::with_capacity(ATTEMPT_ORDER.len());
    for attempt in ATTEMPT_ORDER {
        match run_attempt(attempt, trimmed) {
            AttemptOutcome::Accepted(result) => {
                debug!(?attempt, "Model response accepted");
                trace.push(AttemptTrace {
                    attempt,
                    rejection: None,
                });
                return (Ok(result), trace);
            }
            AttemptOutcome::Rejected(rejection) => {
                debug!(?attempt, ?rejection, "Normalization attempt rejected");
                trace.push(AttemptTrace {
                    attempt,
                    rejection: Some(rejection),
                });
            }
        }
    }

    warn!(
        preview = preview(trimmed, 200),
        "Model response not parsable after all attempts"
    );
    debug!(raw, "Full unparsable model response");
    (
        Err(NormalizeError::UnparsableResponse {
            raw: raw.to_string(),
        }),
        trace,
    )
}

/// Run one attempt against already-trimmed text.
pub fn run_attempt(attempt: Attempt, trimmed: &str) -> AttemptOutcome {
    match candidate(attempt, trimmed) {
        Some(text) => decode_candidate(text),
        None => AttemptOutcome::Rejected(Rejection::NoCandidate),
    }
}

/// Locate the text an attempt should decode.
fn candidate(attempt: Attempt, trimmed: &str) -> Option<&str> {
    match attempt {
        Attempt::Direct => Some(trimmed),
        Attempt::Fenced => FENCE_RE
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|inner| !inner.is_empty()),
        // `{` and `}` are ASCII, so byte offsets are valid char boundaries.
        Attempt::BraceSpan => {
            let start = trimmed.find('{')?;
            let end = trimmed.rfind('}')?;
            (end > start).then(|| &trimmed[start..=end])
        }
    }
}

fn decode_candidate(text: &str) -> AttemptOutcome {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return AttemptOutcome::Rejected(Rejection::InvalidJson(e.to_string())),
    };

    let Some(obj) = value.as_object() else {
        return AttemptOutcome::Rejected(Rejection::MissingFields(
            REQUIRED_LIST_KEYS.iter().map(|(k, _)| *k).collect(),
        ));
    };

    let missing: Vec<&'static str> = REQUIRED_LIST_KEYS
        .iter()
        .filter(|(key, _)| !obj.get(*key).is_some_and(Value::is_array))
        .map(|(key, _)| *key)
        .collect();
    if !missing.is_empty() {
        return AttemptOutcome::Rejected(Rejection::MissingFields(missing));
    }

    AttemptOutcome::Accepted(build_result(obj))
}

/// Build the result from an object already known to carry the list keys.
fn build_result(obj: &Map<String, Value>) -> AnalysisResult {
    let mut result = AnalysisResult::default();
    for (key, field) in REQUIRED_LIST_KEYS {
        if let (Some(items), Some(list)) = (obj.get(key).and_then(Value::as_array), result.list_mut(field)) {
            *list = items.iter().filter_map(item_text).collect();
        }
    }

    result.predicted_yield = obj.get(PREDICTED_YIELD_KEY).and_then(predicted_text);

    let raw_visualizations = VISUALIZATION_KEYS
        .iter()
        .find_map(|key| obj.get(*key))
        .and_then(Value::as_array);
    if let Some(entries) = raw_visualizations {
        result.visualizations = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match convert_visualization(entry) {
                Ok(viz) => Some(viz),
                Err(reason) => {
                    warn!(index, reason = reason.as_str(), "Dropping malformed visualization");
                    None
                }
            })
            .collect();
    }

    result
}

/// Render one list item as display text. `null` items are skipped.
fn item_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn predicted_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert one wire visualization into the typed form.
///
/// Wire shape: `{"title", "type", "chartData": {"labels"?, "datasets": [{"label", "data"}]}}`.
fn convert_visualization(value: &Value) -> Result<Visualization, String> {
    let obj = value.as_object().ok_or("entry is not an object")?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled chart")
        .to_string();

    let kind_str = obj.get("type").and_then(Value::as_str).unwrap_or("");
    let kind = ChartKind::parse(kind_str).ok_or_else(|| format!("unknown chart type '{}'", kind_str))?;

    let chart_data = obj
        .get("chartData")
        .and_then(Value::as_object)
        .ok_or("missing chartData")?;
    let datasets = chart_data
        .get("datasets")
        .and_then(Value::as_array)
        .filter(|d| !d.is_empty())
        .ok_or("no datasets")?;

    let data = if kind.is_categorical() {
        let labels: Vec<String> = chart_data
            .get("labels")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(label_text).collect())
            .unwrap_or_default();
        if labels.is_empty() {
            return Err(format!("{} chart has no category labels", kind));
        }

        let mut series = Vec::with_capacity(datasets.len());
        for (i, dataset) in datasets.iter().enumerate() {
            let (label, points) = dataset_parts(dataset, i)?;
            let values = points
                .iter()
                .map(as_number)
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| format!("series '{}' has non-numeric values", label))?;
            if values.len() != labels.len() {
                return Err(format!(
                    "series '{}' has {} values for {} labels",
                    label,
                    values.len(),
                    labels.len()
                ));
            }
            series.push(ValueSeries { label, values });
        }
        ChartData::Categorical {
            category_labels: labels,
            series,
        }
    } else {
        let mut series = Vec::with_capacity(datasets.len());
        for (i, dataset) in datasets.iter().enumerate() {
            let (label, raw_points) = dataset_parts(dataset, i)?;
            let points = raw_points
                .iter()
                .map(|p| {
                    let x = as_number(p.get("x")?)?;
                    let y = as_number(p.get("y")?)?;
                    Some(Point { x, y })
                })
                .collect::<Option<Vec<Point>>>()
                .ok_or_else(|| format!("series '{}' has points without numeric x/y", label))?;
            series.push(PointSeries { label, points });
        }
        ChartData::Scatter { series }
    };

    Ok(Visualization { title, kind, data })
}

fn dataset_parts(dataset: &Value, index: usize) -> Result<(String, &Vec<Value>), String> {
    let obj = dataset
        .as_object()
        .ok_or_else(|| format!("dataset {} is not an object", index))?;
    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Series {}", index + 1));
    let data = obj
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| format!("dataset '{}' has no data array", label))?;
    Ok((label, data))
}

/// First `max_chars` characters of `text`.
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
