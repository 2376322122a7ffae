//! Job definitions for queue processing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Default number of clips requested when the caller omits it.
pub const DEFAULT_NUM_CLIPS: u32 = 3;
/// Default minimum clip duration in seconds.
pub const DEFAULT_MIN_DURATION: f64 = 20.0;
/// Default maximum clip duration in seconds.
pub const DEFAULT_MAX_DURATION: f64 = 45.0;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id carries no characters (records written without one).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Externally visible job lifecycle.
///
/// Transitions only move forward; `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue
    #[default]
    Queued,
    /// Job has been dequeued and a worker is running it
    Processing,
    /// Job finished, possibly with partial clip failures
    Done,
    /// Job failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Done | JobStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle forward-only.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected lifecycle move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

/// A clip extraction job.
///
/// Field names on the wire follow the queue record format
/// (`job_id`, `video_url`, `num_clips`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    #[serde(rename = "job_id", default)]
    pub id: JobId,

    /// Source video URL
    #[serde(rename = "video_url")]
    pub source_url: String,

    /// Number of clips requested
    #[serde(default = "default_num_clips")]
    pub num_clips: u32,

    /// Minimum accepted clip duration (seconds)
    #[serde(default = "default_min_duration")]
    pub min_duration: f64,

    /// Maximum accepted clip duration (seconds)
    #[serde(default = "default_max_duration")]
    pub max_duration: f64,

    /// Current lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Enqueue timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_num_clips() -> u32 {
    DEFAULT_NUM_CLIPS
}

fn default_min_duration() -> f64 {
    DEFAULT_MIN_DURATION
}

fn default_max_duration() -> f64 {
    DEFAULT_MAX_DURATION
}

impl Job {
    /// Create a queued job with default clip constraints.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            source_url: source_url.into(),
            num_clips: DEFAULT_NUM_CLIPS,
            min_duration: DEFAULT_MIN_DURATION,
            max_duration: DEFAULT_MAX_DURATION,
            status: JobStatus::Queued,
            created_at: Utc::now(),
        }
    }

    pub fn with_num_clips(mut self, num_clips: u32) -> Self {
        self.num_clips = num_clips;
        self
    }

    pub fn with_durations(mut self, min_duration: f64, max_duration: f64) -> Self {
        self.min_duration = min_duration;
        self.max_duration = max_duration;
        self
    }

    /// Move the job forward in its lifecycle.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_record_format() {
        let job: Job = serde_json::from_str(
            r#"{"job_id":"abc","video_url":"https://example.com/v.mp4","num_clips":4}"#,
        )
        .unwrap();
        assert_eq!(job.id.as_str(), "abc");
        assert_eq!(job.source_url, "https://example.com/v.mp4");
        assert_eq!(job.num_clips, 4);
        assert_eq!(job.min_duration, DEFAULT_MIN_DURATION);
        assert_eq!(job.status, JobStatus::Queued);

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["job_id"], "abc");
        assert_eq!(value["video_url"], "https://example.com/v.mp4");
    }

    #[test]
    fn test_status_forward_only() {
        let mut job = Job::new("https://example.com/v.mp4");
        job.transition(JobStatus::Processing).unwrap();
        assert!(job.transition(JobStatus::Queued).is_err());
        job.transition(JobStatus::Done).unwrap();
        assert!(job.transition(JobStatus::Failed).is_err());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_queued_can_fail_directly() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Processing));
    }
}
