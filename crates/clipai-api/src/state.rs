//! Application state.

use std::sync::Arc;

use clipai_queue::{JobQueue, QueueConfig, QueueResult, StatusStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<dyn JobQueue>,
    pub status: Arc<dyn StatusStore>,
}

impl AppState {
    /// Connect to the queue and status store described by `queue_config`.
    pub async fn new(config: ApiConfig, queue_config: &QueueConfig) -> QueueResult<Self> {
        let queue = clipai_queue::connect(queue_config).await?;
        let status = clipai_queue::status_store(queue_config)?;
        Ok(Self::from_parts(config, queue, status))
    }

    pub fn from_parts(config: ApiConfig, queue: Arc<dyn JobQueue>, status: Arc<dyn StatusStore>) -> Self {
        Self {
            config,
            queue,
            status,
        }
    }
}
