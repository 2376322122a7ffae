//! Queue configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which queue implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    /// JSON file on local disk
    #[default]
    File,
    /// Redis Streams consumer group
    Redis,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(QueueBackend::File),
            "redis" => Ok(QueueBackend::Redis),
            other => Err(format!("unknown queue backend: {other}")),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Backend selection
    pub backend: QueueBackend,
    /// Path of the JSON queue file (file backend)
    pub queue_path: PathBuf,
    /// Directory holding per-job status records (file backend)
    pub status_dir: PathBuf,
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// How long a dequeued job stays invisible without a heartbeat
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::File,
            queue_path: PathBuf::from("queue_jobs.json"),
            status_dir: PathBuf::from("job_status"),
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "clipai:jobs".to_string(),
            consumer_group: "clipai:workers".to_string(),
            visibility_timeout: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: std::env::var("QUEUE_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backend),
            queue_path: std::env::var("QUEUE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.queue_path),
            status_dir: std::env::var("STATUS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.status_dir),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}
