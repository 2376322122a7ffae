//! Worker and pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clipai_models::EncodingConfig;

use crate::selection::SelectionConfig;

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// What to do when one candidate's render fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFailurePolicy {
    /// Record the failure and keep rendering the rest
    #[default]
    Isolate,
    /// Fail the whole job on the first render failure
    Abort,
}

impl FromStr for RenderFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown render failure policy: {other}")),
        }
    }
}

/// Per-stage time limits.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    pub download: Duration,
    pub transcribe: Duration,
    pub select: Duration,
    /// Applies to each clip render separately
    pub render: Duration,
    /// Applies to each artefact upload separately
    pub upload: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            download: Duration::from_secs(900),
            transcribe: Duration::from_secs(1800),
            select: Duration::from_secs(300),
            render: Duration::from_secs(1200),
            upload: Duration::from_secs(600),
        }
    }
}

impl StageTimeouts {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            env_parse::<u64>(name)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        Self {
            download: secs("STAGE_TIMEOUT_DOWNLOAD_SECS", defaults.download),
            transcribe: secs("STAGE_TIMEOUT_TRANSCRIBE_SECS", defaults.transcribe),
            select: secs("STAGE_TIMEOUT_SELECT_SECS", defaults.select),
            render: secs("STAGE_TIMEOUT_RENDER_SECS", defaults.render),
            upload: secs("STAGE_TIMEOUT_UPLOAD_SECS", defaults.upload),
        }
    }
}

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub render_failure_policy: RenderFailurePolicy,
    /// Maximum concurrent renders within one job
    pub render_concurrency: usize,
    pub selection: SelectionConfig,
    pub timeouts: StageTimeouts,
    pub encoding: EncodingConfig,
    /// Parent of per-job scratch directories
    pub work_dir: PathBuf,
    /// Attach the error source chain to error payloads
    pub include_traceback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_failure_policy: RenderFailurePolicy::Isolate,
            render_concurrency: 2,
            selection: SelectionConfig::default(),
            timeouts: StageTimeouts::default(),
            encoding: EncodingConfig::default(),
            work_dir: std::env::temp_dir().join("clipai"),
            include_traceback: false,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            render_failure_policy: env_parse("RENDER_FAILURE_POLICY")
                .unwrap_or(defaults.render_failure_policy),
            render_concurrency: env_parse::<usize>("WORKER_RENDER_CONCURRENCY")
                .unwrap_or(defaults.render_concurrency)
                .max(1),
            selection: SelectionConfig {
                enforce_min: env_flag("SELECTION_ENFORCE_MIN").unwrap_or(true),
                enforce_max: env_flag("SELECTION_ENFORCE_MAX").unwrap_or(true),
                cap_to_num_clips: env_flag("SELECTION_CAP_TO_NUM_CLIPS").unwrap_or(false),
            },
            timeouts: StageTimeouts::from_env(),
            encoding: EncodingConfig::from_env(),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            include_traceback: env_flag("INCLUDE_TRACEBACK").unwrap_or(false),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
    /// Interval for extending the lease of a running job
    pub job_heartbeat_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Where outputs are kept when object storage is not configured
    pub output_dir: PathBuf,
    /// Port for the Prometheus scrape endpoint; disabled when `None`
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            poll_interval: Duration::from_millis(500),
            job_heartbeat_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            output_dir: PathBuf::from("outputs"),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse::<usize>("WORKER_MAX_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs)
                .max(1),
            poll_interval: env_parse("WORKER_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            job_heartbeat_interval: env_parse("WORKER_JOB_HEARTBEAT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_heartbeat_interval),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            metrics_port: env_parse("WORKER_METRICS_PORT"),
        }
    }
}
