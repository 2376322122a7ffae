//! Validation of oracle candidates and the deterministic fallback partition.

use serde_json::Value;
use tracing::debug;

use clipai_models::{coerce_seconds, ClipCandidate};

/// Which acceptance checks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionConfig {
    /// Reject candidates shorter than `min_duration`
    pub enforce_min: bool,
    /// Reject candidates longer than `max_duration`
    pub enforce_max: bool,
    /// Keep only the first `num_clips` valid candidates
    pub cap_to_num_clips: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            enforce_min: true,
            enforce_max: true,
            cap_to_num_clips: false,
        }
    }
}

/// Per-job constraints for selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionConstraints {
    pub num_clips: u32,
    pub min_duration: f64,
    pub max_duration: f64,
    /// Source duration in seconds
    pub total_duration: f64,
}

/// Result of validating the oracle's reply.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// At least one candidate passed, in oracle order
    ValidCandidates(Vec<ClipCandidate>),
    /// Nothing usable; partition the video instead
    FallbackNeeded,
}

/// Why a single candidate was dropped.
#[derive(Debug, Clone, PartialEq)]
enum Rejection {
    NotAnObject,
    MissingField(&'static str),
    BadTimestamp(&'static str, String),
    EmptyWindow,
    TooShort(f64),
    TooLong(f64),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotAnObject => write!(f, "not an object"),
            Rejection::MissingField(field) => write!(f, "missing {field}"),
            Rejection::BadTimestamp(field, err) => write!(f, "bad {field}: {err}"),
            Rejection::EmptyWindow => write!(f, "end is not after start"),
            Rejection::TooShort(d) => write!(f, "too short ({d:.1}s)"),
            Rejection::TooLong(d) => write!(f, "too long ({d:.1}s)"),
        }
    }
}

fn text_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_candidate(
    raw: &Value,
    position: usize,
    constraints: &SelectionConstraints,
    config: &SelectionConfig,
) -> Result<ClipCandidate, Rejection> {
    let map = raw.as_object().ok_or(Rejection::NotAnObject)?;

    let start_raw = map.get("start").ok_or(Rejection::MissingField("start"))?;
    let end_raw = map.get("end").ok_or(Rejection::MissingField("end"))?;
    let start = coerce_seconds(start_raw).map_err(|e| Rejection::BadTimestamp("start", e.to_string()))?;
    let end = coerce_seconds(end_raw).map_err(|e| Rejection::BadTimestamp("end", e.to_string()))?;

    if end <= start {
        return Err(Rejection::EmptyWindow);
    }
    let duration = end - start;
    if config.enforce_min && duration < constraints.min_duration {
        return Err(Rejection::TooShort(duration));
    }
    if config.enforce_max && duration > constraints.max_duration {
        return Err(Rejection::TooLong(duration));
    }

    let hashtags = map
        .get("hashtags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ClipCandidate {
        start,
        end,
        title: text_field(map, "title").unwrap_or_else(|| format!("Clip {}", position + 1)),
        reason: text_field(map, "reason").unwrap_or_default(),
        hook: text_field(map, "hook"),
        summary: text_field(map, "summary"),
        hashtags,
    })
}

/// Validate raw oracle candidates, keeping oracle order.
pub fn validate_candidates(
    raw: &[Value],
    constraints: &SelectionConstraints,
    config: &SelectionConfig,
) -> SelectionOutcome {
    let mut accepted = Vec::new();
    for (position, value) in raw.iter().enumerate() {
        match parse_candidate(value, position, constraints, config) {
            Ok(candidate) => accepted.push(candidate),
            Err(reason) => debug!(position, reason = %reason, "Discarded clip candidate"),
        }
    }

    if config.cap_to_num_clips {
        accepted.truncate(constraints.num_clips as usize);
    }

    if accepted.is_empty() {
        SelectionOutcome::FallbackNeeded
    } else {
        SelectionOutcome::ValidCandidates(accepted)
    }
}

/// Slack for comparing window bounds, in seconds.
const WINDOW_EPSILON: f64 = 1e-9;

/// Split `[0, total_duration)` into consecutive windows.
///
/// Window length is `max(min_duration, total_duration / num_clips)`. Windows
/// stop once `num_clips` exist or fewer than `min_duration` seconds remain.
pub fn fallback_partition(total_duration: f64, num_clips: u32, min_duration: f64) -> Vec<ClipCandidate> {
    if num_clips == 0 || !total_duration.is_finite() || total_duration <= 0.0 {
        return Vec::new();
    }
    let min_duration = if min_duration.is_finite() { min_duration.max(0.0) } else { 0.0 };
    let length = min_duration.max(total_duration / num_clips as f64);

    let mut windows = Vec::new();
    while windows.len() < num_clips as usize {
        // Bounds come from the window index so rounding cannot accumulate.
        let start = windows.len() as f64 * length;
        let remaining = total_duration - start;
        if remaining <= WINDOW_EPSILON || remaining + WINDOW_EPSILON < min_duration {
            break;
        }
        let mut end = ((windows.len() + 1) as f64 * length).min(total_duration);
        if total_duration - end <= WINDOW_EPSILON {
            end = total_duration;
        }
        let i = windows.len() + 1;
        windows.push(ClipCandidate::new(
            start,
            end,
            format!("Clip {i}"),
            "Fallback window: no usable candidates from the scoring service",
        ));
    }
    windows
}

/// Resolve an outcome into the windows to render.
pub fn resolve(outcome: SelectionOutcome, constraints: &SelectionConstraints) -> (Vec<ClipCandidate>, bool) {
    match outcome {
        SelectionOutcome::ValidCandidates(candidates) => (candidates, false),
        SelectionOutcome::FallbackNeeded => (
            fallback_partition(
                constraints.total_duration,
                constraints.num_clips,
                constraints.min_duration,
            ),
            true,
        ),
    }
}
