//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("R2 is not configured: {0}")]
    NotConfigured(String),

    #[error("Upload of {key} failed: {reason}")]
    UploadFailed { key: String, reason: String },

    /// Keys are built from job ids and file names; both must be a single
    /// path component.
    #[error("Invalid object key component: {0:?}")]
    InvalidKey(String),

    #[error("R2 request failed: {0}")]
    Request(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    pub fn upload_failed(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::UploadFailed {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_key(component: impl Into<String>) -> Self {
        Self::InvalidKey(component.into())
    }
}
