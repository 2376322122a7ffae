//! Worker error types.

use thiserror::Error;

use clipai_models::PipelineStage;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Boxed cause attached to stage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Download failed: {message}")]
    Download {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Transcription failed: {message}")]
    Transcription {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Clip selection failed: {0}")]
    Selection(String),

    #[error("Render of clip {index} failed: {message}")]
    Render {
        index: u32,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Upload failed: {message}")]
    Upload {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Stage {stage} timed out after {secs}s")]
    Timeout { stage: PipelineStage, secs: u64 },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition {
        from: PipelineStage,
        to: PipelineStage,
    },

    #[error("Queue error: {0}")]
    Queue(#[from] clipai_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] clipai_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] clipai_storage::StorageError),

    #[error("ML service error: {0}")]
    Ml(#[from] clipai_ml_client::MlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn selection(msg: impl Into<String>) -> Self {
        Self::Selection(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Download failure caused by `err`.
    pub fn download(err: impl Into<BoxError>) -> Self {
        let source = err.into();
        Self::Download {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn transcription(err: impl Into<BoxError>) -> Self {
        let source = err.into();
        Self::Transcription {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn render(index: u32, err: impl Into<BoxError>) -> Self {
        let source = err.into();
        Self::Render {
            index,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Render failure without an underlying cause.
    pub fn render_msg(index: u32, msg: impl Into<String>) -> Self {
        Self::Render {
            index,
            message: msg.into(),
            source: None,
        }
    }

    pub fn upload(err: impl Into<BoxError>) -> Self {
        let source = err.into();
        Self::Upload {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn timeout(stage: PipelineStage, secs: u64) -> Self {
        Self::Timeout { stage, secs }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }

    /// Messages of this error and every underlying cause, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}
