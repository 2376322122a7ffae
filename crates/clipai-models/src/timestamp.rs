//! Timestamp parsing for oracle-provided clip bounds.
//!
//! The scoring oracle returns bounds as JSON numbers most of the time, but
//! strings such as `"12.5"`, `"01:05"` or `"00:01:05.250"` show up too.

use serde_json::Value;
use thiserror::Error;

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Timestamp is not a finite number")]
    NotFinite,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS or SS")]
    InvalidFormat(String),

    #[error("Timestamp exceeds maximum allowed duration ({} hours)", .0 / 3600.0)]
    ExceedsMaxDuration(f64),

    #[error("Expected a number or string, got {0}")]
    WrongType(&'static str),
}

fn component(name: &'static str, raw: &str) -> Result<f64, TimestampError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))?;
    if !value.is_finite() {
        return Err(TimestampError::NotFinite);
    }
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

/// Parse a timestamp string to total seconds.
///
/// Supports `HH:MM:SS(.mmm)`, `MM:SS(.mmm)` and `SS(.mmm)`.
///
/// # Examples
/// ```
/// use clipai_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let total = match parts.as_slice() {
        [s] => component("seconds", s)?,
        [m, s] => component("minutes", m)? * 60.0 + component("seconds", s)?,
        [h, m, s] => {
            component("hours", h)? * 3600.0 + component("minutes", m)? * 60.0 + component("seconds", s)?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_VIDEO_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration(MAX_VIDEO_DURATION_SECS));
    }
    Ok(total)
}

/// Coerce a loosely-typed JSON bound to seconds.
pub fn coerce_seconds(value: &Value) -> Result<f64, TimestampError> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64().ok_or(TimestampError::NotFinite)?;
            if !secs.is_finite() {
                return Err(TimestampError::NotFinite);
            }
            if secs < 0.0 {
                return Err(TimestampError::Negative);
            }
            Ok(secs)
        }
        Value::String(s) => parse_timestamp(s),
        Value::Null => Err(TimestampError::WrongType("null")),
        Value::Bool(_) => Err(TimestampError::WrongType("bool")),
        Value::Array(_) => Err(TimestampError::WrongType("array")),
        Value::Object(_) => Err(TimestampError::WrongType("object")),
    }
}
