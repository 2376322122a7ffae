//! Cloudflare R2 storage for rendered clips.
//!
//! Clips are uploaded under `{job_id}/{file_name}` and addressed through the
//! bucket's public base URL.

pub mod client;
pub mod error;
pub mod keys;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{clip_key, content_type_for};
