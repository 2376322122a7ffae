//! R2 client implementation.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL clips are served from; falls back to
    /// `{endpoint_url}/{bucket_name}` when unset.
    pub public_base_url: Option<String>,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`R2Config::from_env`], but `None` when no R2 variable is set at
    /// all. A partial configuration is still an error.
    pub fn from_env_optional() -> StorageResult<Option<Self>> {
        Self::optional_from_lookup(|name| std::env::var(name).ok())
    }

    fn optional_from_lookup<F>(lookup: F) -> StorageResult<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let any_set = ["R2_ENDPOINT_URL", "R2_ACCESS_KEY_ID", "R2_SECRET_ACCESS_KEY", "R2_BUCKET_NAME"]
            .iter()
            .any(|name| lookup(name).is_some_and(|v| !v.trim().is_empty()));
        if !any_set {
            return Ok(None);
        }
        Self::from_lookup(lookup).map(Some)
    }

    fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| StorageError::not_configured(format!("{name} not set")))
        };

        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: lookup("R2_REGION").unwrap_or_else(|| "auto".to_string()),
            public_base_url: lookup("R2_PUBLIC_BASE_URL").filter(|v| !v.trim().is_empty()),
        })
    }

    /// Base every public URL is built from, without a trailing slash.
    pub fn public_base(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "{}/{}",
                self.endpoint_url.trim_end_matches('/'),
                self.bucket_name
            ),
        }
    }
}

/// Public URL for `key` under `base`, percent-encoding each path segment.
pub fn public_url_for(base: &str, key: &str) -> String {
    let encoded = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", base.trim_end_matches('/'), encoded)
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let public_base = config.public_base();
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a file to R2.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(key, e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(key, e))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Public URL for an uploaded object.
    pub fn public_url(&self, key: &str) -> String {
        public_url_for(&self.public_base, key)
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("head bucket {}: {}", self.bucket, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("R2_ENDPOINT_URL", "https://acct.r2.cloudflarestorage.com"),
            ("R2_ACCESS_KEY_ID", "key"),
            ("R2_SECRET_ACCESS_KEY", "secret"),
            ("R2_BUCKET_NAME", "clips"),
        ])
    }

    #[test]
    fn test_config_from_lookup() {
        let vars = full_env();
        let config = R2Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.bucket_name, "clips");
        assert_eq!(config.region, "auto");
        assert_eq!(
            config.public_base(),
            "https://acct.r2.cloudflarestorage.com/clips"
        );
    }

    #[test]
    fn test_config_missing_var() {
        let mut vars = full_env();
        vars.remove("R2_SECRET_ACCESS_KEY");
        let err = R2Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("R2_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn test_optional_config() {
        let empty: HashMap<String, String> = HashMap::new();
        assert!(R2Config::optional_from_lookup(|k| empty.get(k).cloned())
            .unwrap()
            .is_none());

        let partial = env(&[("R2_BUCKET_NAME", "clips")]);
        assert!(R2Config::optional_from_lookup(|k| partial.get(k).cloned()).is_err());

        let vars = full_env();
        assert!(R2Config::optional_from_lookup(|k| vars.get(k).cloned())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_public_url_encodes_segments() {
        assert_eq!(
            public_url_for("https://cdn.example.com/", "job 1/short_01.mp4"),
            "https://cdn.example.com/job%201/short_01.mp4"
        );
    }

    #[tokio::test]
    async fn test_client_public_url() {
        let mut vars = full_env();
        vars.insert("R2_PUBLIC_BASE_URL".into(), "https://pub.example.com".into());
        let config = R2Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let client = R2Client::new(config).await.unwrap();
        assert_eq!(
            client.public_url("abc/short_02.mp4"),
            "https://pub.example.com/abc/short_02.mp4"
        );
    }
}
