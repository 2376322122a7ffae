//! Prometheus metrics for the worker.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "clipai_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "clipai_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "clipai_jobs_in_flight";
    pub const CLIPS_RENDERED_TOTAL: &str = "clipai_clips_rendered_total";
    pub const RENDER_FAILURES_TOTAL: &str = "clipai_render_failures_total";
    pub const STAGE_DURATION_SECONDS: &str = "clipai_stage_duration_seconds";
}

/// Serve `/metrics` for Prometheus on `0.0.0.0:{port}`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config(format!("metrics exporter: {e}")))
}

/// Record a finished job (`done`, `failed` or `cancelled`).
pub fn record_job(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn job_started() {
    gauge!(names::JOBS_IN_FLIGHT).increment(1.0);
}

pub fn job_finished() {
    gauge!(names::JOBS_IN_FLIGHT).decrement(1.0);
}

pub fn record_clip_rendered() {
    counter!(names::CLIPS_RENDERED_TOTAL).increment(1);
}

pub fn record_render_failure() {
    counter!(names::RENDER_FAILURES_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
