//! HTTP client for the OpenAI-compatible API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::error::{MlError, MlResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_SCORING_MODEL: &str = "gpt-4o-mini";

/// Configuration for ML client.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Bearer token; calls fail with `NotConfigured` when absent
    pub api_key: Option<String>,
    /// Base URL including the version prefix
    pub base_url: String,
    pub transcription_model: String,
    pub scoring_model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Transport-level retries for retryable errors
    pub max_retries: u32,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            scoring_model: DEFAULT_SCORING_MODEL.to_string(),
            timeout: Duration::from_secs(600), // long uploads for transcription
            max_retries: 0,
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            transcription_model: std::env::var("OPENAI_TRANSCRIPTION_MODEL")
                .unwrap_or(defaults.transcription_model),
            scoring_model: std::env::var("OPENAI_SCORING_MODEL").unwrap_or(defaults.scoring_model),
            timeout: Duration::from_secs(
                std::env::var("OPENAI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_retries: std::env::var("OPENAI_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Client for the transcription and scoring endpoints.
#[derive(Clone)]
pub struct MlClient {
    pub(crate) http: Client,
    pub(crate) config: MlClientConfig,
}

impl MlClient {
    /// Create a new ML client.
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub fn config(&self) -> &MlClientConfig {
        &self.config
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn api_key(&self) -> MlResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| MlError::not_configured("OPENAI_API_KEY not set"))
    }

    /// Send a request built by `build`, mapping transport and status errors.
    pub(crate) async fn send<F>(&self, build: F) -> MlResult<Response>
    where
        F: Fn() -> MlResult<RequestBuilder>,
    {
        let timeout_secs = self.config.timeout.as_secs();
        let build = &build;
        self.with_retry(move || async move {
            let response = build()?.send().await.map_err(|e| {
                if e.is_timeout() {
                    MlError::Timeout(timeout_secs)
                } else {
                    MlError::Network(e)
                }
            })?;
            check_status(response).await
        })
        .await
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "ML request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn check_status(response: Response) -> MlResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("ML service returned {}: {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(MlError::ServiceUnavailable(message))
    } else {
        Err(MlError::RequestFailed(message))
    }
}
