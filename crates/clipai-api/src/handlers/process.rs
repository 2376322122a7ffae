//! Job submission.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use clipai_models::job::{DEFAULT_MAX_DURATION, DEFAULT_MIN_DURATION, DEFAULT_NUM_CLIPS};
use clipai_models::{Job, JobId};
use clipai_queue::JobStatusRecord;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Upper bound on clips per job.
pub const MAX_NUM_CLIPS: u32 = 20;

fn default_num_clips() -> u32 {
    DEFAULT_NUM_CLIPS
}

fn default_min_duration() -> f64 {
    DEFAULT_MIN_DURATION
}

fn default_max_duration() -> f64 {
    DEFAULT_MAX_DURATION
}

/// Body of `POST /process`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_duration_order", skip_on_field_errors = true))]
pub struct ProcessRequest {
    #[validate(custom(function = "validate_http_url"))]
    pub video_url: String,
    #[serde(default = "default_num_clips")]
    #[validate(range(min = 1, max = MAX_NUM_CLIPS))]
    pub num_clips: u32,
    #[serde(default = "default_min_duration")]
    #[validate(range(exclusive_min = 0.0))]
    pub min_duration: f64,
    #[serde(default = "default_max_duration")]
    #[validate(range(exclusive_min = 0.0))]
    pub max_duration: f64,
}

fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        _ => Err(ValidationError::new("http_url")
            .with_message("video_url must be an http or https URL".into())),
    }
}

fn validate_duration_order(req: &ProcessRequest) -> Result<(), ValidationError> {
    if req.min_duration > req.max_duration {
        return Err(ValidationError::new("duration_order")
            .with_message("min_duration must not exceed max_duration".into()));
    }
    Ok(())
}

impl ProcessRequest {
    pub fn into_job(self) -> Job {
        Job::new(self.video_url.trim())
            .with_num_clips(self.num_clips)
            .with_durations(self.min_duration, self.max_duration)
    }
}

/// Reply to a successful submission.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub job_id: JobId,
}

/// Parse and validate a submission body.
///
/// `video_url` is checked before anything else so a missing URL always gets
/// the same message regardless of other problems in the body.
pub fn parse_process_request(body: Value) -> ApiResult<ProcessRequest> {
    let has_url = body
        .get("video_url")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !has_url {
        return Err(ApiError::bad_request("Missing video_url"));
    }

    let request: ProcessRequest =
        serde_json::from_value(body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    request.validate()?;
    Ok(request)
}

/// `POST /process`: enqueue a job.
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let Json(body) = payload?;
    let request = parse_process_request(body)?;
    let job = request.into_job();

    info!(
        video_url = %job.source_url,
        num_clips = job.num_clips,
        min_duration = job.min_duration,
        max_duration = job.max_duration,
        "Enqueueing job"
    );

    let job_id = state.queue.enqueue(job).await?;
    metrics::record_job_enqueued();

    if let Err(e) = state.status.put(&JobStatusRecord::queued(job_id.clone())).await {
        warn!(job_id = %job_id, "Failed to write queued status: {}", e);
    }

    Ok(Json(ProcessResponse {
        status: "queued",
        job_id,
    }))
}
