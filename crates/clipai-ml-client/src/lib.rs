//! Client for the OpenAI-compatible oracles the pipeline calls.
//!
//! - Transcription: audio in, timestamped segments out
//! - Scoring: transcript and constraints in, raw candidate windows out
//!
//! Scoring output is returned as raw JSON values; validating it into clip
//! candidates is the caller's job.

pub mod client;
pub mod error;
pub mod scoring;
pub mod transcription;
pub mod types;

pub use client::{MlClient, MlClientConfig};
pub use error::{MlError, MlResult};
pub use scoring::{build_transcript_lines, parse_clips, strip_code_fences, ScoringRequest};
