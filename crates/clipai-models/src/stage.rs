//! Pipeline stages a job moves through inside a worker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::JobStatus;

/// Stage of the per-job state machine.
///
/// `Queued → Downloading → Transcribing → Selecting → Rendering → Uploading → Done`,
/// with every non-terminal stage allowed to move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Queued,
    Downloading,
    Transcribing,
    Selecting,
    Rendering,
    Uploading,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Queued => "queued",
            PipelineStage::Downloading => "downloading",
            PipelineStage::Transcribing => "transcribing",
            PipelineStage::Selecting => "selecting",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Uploading => "uploading",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    /// The stage that follows on success, if any.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Queued => Some(PipelineStage::Downloading),
            PipelineStage::Downloading => Some(PipelineStage::Transcribing),
            PipelineStage::Transcribing => Some(PipelineStage::Selecting),
            PipelineStage::Selecting => Some(PipelineStage::Rendering),
            PipelineStage::Rendering => Some(PipelineStage::Uploading),
            PipelineStage::Uploading => Some(PipelineStage::Done),
            PipelineStage::Done | PipelineStage::Failed => None,
        }
    }

    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == PipelineStage::Failed || self.next() == Some(next)
    }

    /// Coarse lifecycle status exposed to callers.
    pub fn job_status(&self) -> JobStatus {
        match self {
            PipelineStage::Queued => JobStatus::Queued,
            PipelineStage::Done => JobStatus::Done,
            PipelineStage::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_sequence() {
        let mut stage = PipelineStage::Queued;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(stage.can_transition_to(next));
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(stage, PipelineStage::Done);
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!PipelineStage::Downloading.can_transition_to(PipelineStage::Selecting));
        assert!(!PipelineStage::Rendering.can_transition_to(PipelineStage::Transcribing));
        assert!(PipelineStage::Rendering.can_transition_to(PipelineStage::Failed));
        assert!(!PipelineStage::Failed.can_transition_to(PipelineStage::Failed));
        assert!(!PipelineStage::Done.can_transition_to(PipelineStage::Failed));
    }

    #[test]
    fn test_job_status_mapping() {
        assert_eq!(PipelineStage::Rendering.job_status(), JobStatus::Processing);
        assert_eq!(PipelineStage::Done.job_status(), JobStatus::Done);
    }
}
