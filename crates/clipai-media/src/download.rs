//! Source media download over HTTP(S).
//!
//! Bytes are streamed into a `.part` file next to the destination and renamed
//! into place only once the body is complete, so a failed or cancelled
//! download never leaves a truncated file at `output_path`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Download limits.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Refuse bodies larger than this many bytes
    pub max_bytes: u64,
    /// User agent sent with the request
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(900),
            max_bytes: 4 * 1024 * 1024 * 1024,
            user_agent: format!("clipai-engine/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DownloadConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: std::env::var("DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_bytes: std::env::var("DOWNLOAD_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_bytes),
            user_agent: defaults.user_agent,
        }
    }
}

/// Parse and check a source URL; only `http` and `https` are fetched.
pub fn validate_source_url(raw: &str) -> MediaResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MediaError::InvalidUrl("empty URL".to_string()));
    }
    let url = Url::parse(raw).map_err(|e| MediaError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(MediaError::InvalidUrl(format!("{raw}: missing host"))),
        other => Err(MediaError::InvalidUrl(format!("unsupported scheme '{other}'"))),
    }
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}

/// Download `url` to `output_path`, returning the number of bytes written.
pub async fn download_video(
    url: &str,
    output_path: impl AsRef<Path>,
    config: &DownloadConfig,
) -> MediaResult<u64> {
    let output_path = output_path.as_ref();
    let url = validate_source_url(url)?;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!(
        host = url.host_str().unwrap_or_default(),
        output = %output_path.display(),
        "Downloading source video"
    );

    let part = part_path(output_path);
    match fetch_to(&url, &part, config).await {
        Ok(written) => {
            tokio::fs::rename(&part, output_path).await?;
            info!(
                output = %output_path.display(),
                size_mb = written as f64 / (1024.0 * 1024.0),
                "Downloaded video successfully"
            );
            Ok(written)
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                debug!("No partial download to clean up: {}", cleanup);
            }
            warn!(error = %e, "Download failed");
            Err(e)
        }
    }
}

async fn fetch_to(url: &Url, part: &Path, config: &DownloadConfig) -> MediaResult<u64> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(&config.user_agent)
        .build()?;

    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::download_failed(format!(
            "HTTP {} fetching source",
            status.as_u16()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > config.max_bytes {
            return Err(MediaError::download_failed(format!(
                "source is {} bytes, limit is {}",
                len, config.max_bytes
            )));
        }
    }

    let mut file = tokio::fs::File::create(part).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > config.max_bytes {
            return Err(MediaError::download_failed(format!(
                "source exceeds {} bytes",
                config.max_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if written == 0 {
        return Err(MediaError::download_failed("empty response body"));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_validate_source_url() {
        assert!(validate_source_url("https://cdn.example.com/v.mp4").is_ok());
        assert!(validate_source_url("http://localhost:8080/v.mp4").is_ok());
        assert!(matches!(validate_source_url(""), Err(MediaError::InvalidUrl(_))));
        assert!(matches!(validate_source_url("ftp://x/v.mp4"), Err(MediaError::InvalidUrl(_))));
        assert!(matches!(validate_source_url("file:///etc/passwd"), Err(MediaError::InvalidUrl(_))));
        assert!(matches!(validate_source_url("not a url"), Err(MediaError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("source.mp4");
        let written = download_video(
            &format!("{}/video.mp4", server.uri()),
            &out,
            &DownloadConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::metadata(&out).unwrap().len(), 4096);
        assert!(!part_path(&out).exists());
    }

    #[tokio::test]
    async fn test_download_http_error_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("source.mp4");
        let err = download_video(
            &format!("{}/missing.mp4", server.uri()),
            &out,
            &DownloadConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("404"));
        assert!(!out.exists());
        assert!(!part_path(&out).exists());
    }

    #[tokio::test]
    async fn test_download_respects_size_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("source.mp4");
        let config = DownloadConfig {
            max_bytes: 1024,
            ..DownloadConfig::default()
        };
        let result = download_video(&server.uri(), &out, &config).await;
        assert!(matches!(result, Err(MediaError::DownloadFailed { .. })));
        assert!(!out.exists());
    }
}
