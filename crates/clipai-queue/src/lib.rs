//! Job queue and status store for the ClipAI engine.
//!
//! This crate provides:
//! - A leased FIFO queue contract ([`JobQueue`])
//! - A file-backed queue for single-host deployments
//! - A Redis Streams queue for distributed workers
//! - Per-job status records read by the HTTP front end

pub mod config;
pub mod error;
pub mod file;
pub mod lease;
pub mod redis_queue;
pub mod status;

pub use config::{QueueBackend, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use file::FileJobQueue;
pub use lease::{JobQueue, LeasedJob};
pub use redis_queue::RedisJobQueue;
pub use status::{FileStatusStore, JobStatusRecord, RedisStatusStore, StatusStore};

use std::sync::Arc;

/// Build the queue selected by `config.backend`.
pub async fn connect(config: &QueueConfig) -> QueueResult<Arc<dyn JobQueue>> {
    match config.backend {
        QueueBackend::File => Ok(Arc::new(FileJobQueue::new(
            &config.queue_path,
            config.visibility_timeout,
        ))),
        QueueBackend::Redis => {
            let queue = RedisJobQueue::new(config.clone())?;
            queue.init().await?;
            Ok(Arc::new(queue))
        }
    }
}

/// Build the status store matching `config.backend`.
pub fn status_store(config: &QueueConfig) -> QueueResult<Arc<dyn StatusStore>> {
    match config.backend {
        QueueBackend::File => Ok(Arc::new(FileStatusStore::new(&config.status_dir))),
        QueueBackend::Redis => Ok(Arc::new(RedisStatusStore::new(&config.redis_url)?)),
    }
}
