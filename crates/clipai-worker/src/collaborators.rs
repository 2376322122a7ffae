//! Seams between the orchestrator and the outside world.
//!
//! Each trait is one external collaborator. Real implementations live in
//! [`crate::adapters`]; tests substitute mocks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use clipai_models::{JobId, OutputLocation, TranscriptSegment};

use crate::error::WorkerResult;

/// One clip render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSpec {
    /// 1-based clip index
    pub index: u32,
    pub source: PathBuf,
    /// Window on the source timeline, seconds
    pub start: f64,
    pub end: f64,
    /// ASS script to burn in; `None` when the window has no speech
    pub subtitles: Option<PathBuf>,
    pub output: PathBuf,
}

/// Everything the scoring oracle is told about a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringInput {
    pub segments: Vec<TranscriptSegment>,
    pub visual_peaks: Vec<f64>,
    pub num_clips: u32,
    pub min_duration: f64,
    pub max_duration: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fetch `url` into `dest`, returning the bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> WorkerResult<u64>;

    /// Duration of a local video in seconds.
    async fn duration(&self, video: &Path) -> WorkerResult<f64>;

    /// Visual energy peaks in seconds, used as a scoring hint.
    async fn visual_peaks(&self, video: &Path) -> WorkerResult<Vec<f64>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Segments on the video's global timeline. `work_dir` may hold
    /// intermediate files.
    async fn transcribe(&self, video: &Path, work_dir: &Path) -> WorkerResult<Vec<TranscriptSegment>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipScorer: Send + Sync {
    /// Raw candidate windows, unvalidated.
    async fn score(&self, input: &ScoringInput) -> WorkerResult<Vec<Value>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    /// Encode one clip; returns the local output path.
    async fn render(&self, spec: &RenderSpec) -> WorkerResult<PathBuf>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist a job artefact and report where it ended up.
    async fn store(&self, job_id: &JobId, file: &Path) -> WorkerResult<OutputLocation>;
}

/// The full set of collaborators a pipeline run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub media: Arc<dyn MediaSource>,
    pub transcriber: Arc<dyn Transcriber>,
    pub scorer: Arc<dyn ClipScorer>,
    pub renderer: Arc<dyn ClipRenderer>,
    pub store: Arc<dyn ObjectStore>,
}
