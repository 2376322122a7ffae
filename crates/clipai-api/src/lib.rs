//! Axum HTTP API server.
//!
//! This crate provides:
//! - `POST /process` job submission onto the shared queue
//! - Job status lookups backed by the status store
//! - Liveness and readiness probes
//! - Security headers, request ids and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
