//! Per-job status records.
//!
//! Workers write a record at every stage change; the HTTP front end reads it
//! back for `GET /jobs/:job_id`. Records are snapshots, last write wins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use clipai_models::{JobId, JobStatus, PipelineStage};

use crate::error::{QueueError, QueueResult};

/// Redis key TTL for status records (7 days).
pub const JOB_STATUS_TTL_SECS: u64 = 7 * 24 * 3600;

/// Snapshot of a job's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stage: PipelineStage,
    /// Final response payload once the job is terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusRecord {
    pub fn queued(job_id: JobId) -> Self {
        Self::at_stage(job_id, PipelineStage::Queued)
    }

    pub fn at_stage(job_id: JobId, stage: PipelineStage) -> Self {
        Self {
            job_id,
            status: stage.job_status(),
            stage,
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Storage for status records.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn put(&self, record: &JobStatusRecord) -> QueueResult<()>;

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>>;
}

/// One JSON file per job under a directory.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn record_path(&self, job_id: &JobId) -> QueueResult<PathBuf> {
        let id = job_id.as_str();
        // Ids come from request paths; keep them to a single path component.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(QueueError::InvalidJobId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn put(&self, record: &JobStatusRecord) -> QueueResult<()> {
        let path = self.record_path(&record.job_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(job_id = %record.job_id, stage = %record.stage, "Stored job status");
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>> {
        let path = match self.record_path(job_id) {
            Ok(path) => path,
            Err(QueueError::InvalidJobId(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Status records as Redis string keys with a TTL.
pub struct RedisStatusStore {
    client: redis::Client,
}

impl RedisStatusStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn key(job_id: &JobId) -> String {
        format!("clipai:status:{}", job_id)
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn put(&self, record: &JobStatusRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(Self::key(&record.job_id), payload, JOB_STATUS_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(Self::key(job_id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(QueueError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_status_roundtrip_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FileStatusStore::new(dir.path());
        let id = JobId::new();

        assert!(store.get(&id).await.unwrap().is_none());

        store.put(&JobStatusRecord::queued(id.clone())).await.unwrap();
        let done = JobStatusRecord::at_stage(id.clone(), PipelineStage::Done)
            .with_result(json!({"status": "done", "clips": []}));
        store.put(&done).await.unwrap();

        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Done);
        assert_eq!(loaded.result.unwrap()["status"], "done");
    }

    #[tokio::test]
    async fn test_file_status_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileStatusStore::new(dir.path());
        let sneaky = JobId::from_string("../etc/passwd");
        assert!(store.get(&sneaky).await.unwrap().is_none());
        assert!(store.put(&JobStatusRecord::queued(sneaky)).await.is_err());
    }
}
