//! Clip pipeline worker.
//!
//! This crate provides:
//! - The per-job pipeline state machine with stage timeouts and cancellation
//! - Clip candidate validation and the fallback partition
//! - A bounded job executor with lease heartbeats and graceful shutdown
//! - The invocation event handler used by the `clipai-invoke` binary
//! - Result payloads shared by every entry point

pub mod adapters;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod executor;
pub mod invocation;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod result;
pub mod selection;

#[cfg(test)]
mod test_support;

pub use adapters::collaborators_from_env;
pub use collaborators::{
    ClipRenderer, ClipScorer, Collaborators, MediaSource, ObjectStore, RenderSpec, ScoringInput,
    Transcriber,
};
pub use config::{PipelineConfig, RenderFailurePolicy, StageTimeouts, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use invocation::InvocationHandler;
pub use logging::JobLogger;
pub use pipeline::{PipelineOrchestrator, PipelineOutput};
pub use result::{ClipResult, FailureResult, JobResponse, ResultAssembler};
pub use selection::{SelectionConfig, SelectionOutcome};
