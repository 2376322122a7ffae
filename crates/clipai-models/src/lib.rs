//! Shared data models for the ClipAI engine.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and pipeline stages
//! - Transcript segments on the global and clip-local timelines
//! - Word timings and subtitle cues
//! - Clip candidates, rendered clips and per-clip failures
//! - Encoding configuration

pub mod clip;
pub mod encoding;
pub mod job;
pub mod stage;
pub mod timestamp;
pub mod transcript;

// Re-export common types
pub use clip::{ClipCandidate, ClipFailure, OutputLocation, RenderedClip};
pub use encoding::EncodingConfig;
pub use job::{Job, JobId, JobStatus, TransitionError};
pub use stage::PipelineStage;
pub use timestamp::{coerce_seconds, parse_timestamp, TimestampError};
pub use transcript::{LocalSegment, SubtitleCue, TranscriptSegment, WordTiming};
