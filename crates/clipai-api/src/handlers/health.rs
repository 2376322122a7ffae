//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::metrics;
use crate::state::AppState;

/// `GET /ping`.
pub async fn ping() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /`.
pub async fn root() -> Json<Value> {
    Json(json!({"status": "ok", "message": "ClipAI API is running"}))
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub queue: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64, length: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
            length: Some(length),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
            length: None,
        }
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks that the job queue is reachable.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let start = Instant::now();
    let queue_check = match state.queue.check_connectivity().await {
        Ok(()) => match state.queue.len().await {
            Ok(length) => {
                metrics::set_queue_length(length);
                CheckStatus::ok(start.elapsed().as_millis() as u64, length)
            }
            Err(e) => CheckStatus::error(e.to_string()),
        },
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let all_ok = queue_check.status == "ok";
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        queue: queue_check,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
