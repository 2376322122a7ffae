//! Clip candidates and rendered clip records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A proposed `[start, end)` window on the source video's global timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipCandidate {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
}

impl ClipCandidate {
    pub fn new(start: f64, end: f64, title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            start,
            end,
            title: title.into(),
            reason: reason.into(),
            hook: None,
            summary: None,
            hashtags: Vec::new(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Where an output artefact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLocation {
    /// Public URL in object storage
    Remote { url: String },
    /// Path on the worker's filesystem
    Local { path: String },
}

impl OutputLocation {
    pub fn as_str(&self) -> &str {
        match self {
            OutputLocation::Remote { url } => url,
            OutputLocation::Local { path } => path,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

/// A successfully rendered and stored clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderedClip {
    /// 1-based index in candidate acceptance order
    pub index: u32,
    pub candidate: ClipCandidate,
    pub video_location: OutputLocation,
    pub subtitle_location: OutputLocation,
}

/// A candidate whose render failed while the job carried on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipFailure {
    pub index: u32,
    pub candidate: ClipCandidate,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_optional_fields_skipped() {
        let c = ClipCandidate::new(1.0, 21.0, "Title", "Reason");
        let value = serde_json::to_value(&c).unwrap();
        assert!(value.get("hook").is_none());
        assert!(value.get("hashtags").is_none());
        assert_eq!(c.duration(), 20.0);
    }

    #[test]
    fn test_output_location() {
        let loc = OutputLocation::Local {
            path: "/tmp/short_01.mp4".into(),
        };
        assert_eq!(loc.as_str(), "/tmp/short_01.mp4");
        assert!(!loc.is_empty());
    }
}
