//! Job status lookups.

use axum::extract::{Path, State};
use axum::Json;

use clipai_models::JobId;
use clipai_queue::JobStatusRecord;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /jobs/:job_id`: latest status record for a job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusRecord>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::bad_request("Invalid job id"));
    }
    let id = JobId::from_string(job_id);
    state
        .status
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {id}")))
}

/// Job ids are generated UUIDs; reject anything that could escape a path
/// or key namespace.
fn is_valid_job_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_job_ids() {
        assert!(is_valid_job_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_job_id("job-1"));
    }

    #[test]
    fn test_invalid_job_ids() {
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("../etc"));
        assert!(!is_valid_job_id("has space"));
        assert!(!is_valid_job_id("has.dot"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }
}
