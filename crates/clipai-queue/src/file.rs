//! File-backed job queue.
//!
//! The queue is a single JSON array of job records, oldest first. Every
//! mutation runs under an exclusive `flock` on a sidecar lock file so the API
//! process and worker processes can share one queue file, and every write goes
//! through a temp file plus rename so a crash never leaves a torn file.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use clipai_models::{Job, JobId};

use crate::error::{QueueError, QueueResult};
use crate::lease::{JobQueue, LeasedJob};

/// One stored queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueRecord {
    #[serde(flatten)]
    job: Job,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lease_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    leased_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    deliveries: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl QueueRecord {
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        match self.leased_until {
            None => true,
            Some(until) => until <= now,
        }
    }

    fn holds(&self, lease: &LeasedJob) -> bool {
        self.job.id == lease.job.id && self.lease_token.as_deref() == Some(lease.receipt.as_str())
    }
}

/// JSON-file queue with leases.
#[derive(Debug, Clone)]
pub struct FileJobQueue {
    path: PathBuf,
    visibility_timeout: Duration,
}

impl FileJobQueue {
    pub fn new(path: impl AsRef<Path>, visibility_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            visibility_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lease_span(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(600))
    }

    /// Run `f` against the stored records under the file lock.
    ///
    /// `f` returns its result plus whether the records changed and must be
    /// written back.
    async fn with_records<R, F>(&self, f: F) -> QueueResult<R>
    where
        F: FnOnce(&mut Vec<QueueRecord>) -> QueueResult<(R, bool)> + Send + 'static,
        R: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || locked_update(&path, f))
            .await
            .map_err(|e| QueueError::storage(format!("queue task failed: {e}")))?
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn read_records(path: &Path) -> QueueResult<Vec<QueueRecord>> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_records(path: &Path, records: &[QueueRecord]) -> QueueResult<()> {
    let tmp = temp_path(path);
    std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn locked_update<R, F>(path: &Path, f: F) -> QueueResult<R>
where
    F: FnOnce(&mut Vec<QueueRecord>) -> QueueResult<(R, bool)>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))?;
    let _lock = Flock::lock(lock_file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| QueueError::storage(format!("failed to lock queue file: {errno}")))?;

    let mut records = read_records(path)?;
    let (result, changed) = f(&mut records)?;
    if changed {
        write_records(path, &records)?;
    }
    Ok(result)
}

#[async_trait]
impl JobQueue for FileJobQueue {
    async fn enqueue(&self, mut job: Job) -> QueueResult<JobId> {
        if job.id.is_empty() {
            job.id = JobId::new();
        }
        let job_id = job.id.clone();

        self.with_records(move |records| {
            if records.iter().any(|r| r.job.id == job.id) {
                return Err(QueueError::enqueue_failed(format!("duplicate job id {}", job.id)));
            }
            records.push(QueueRecord {
                job,
                lease_token: None,
                leased_until: None,
                deliveries: 0,
            });
            Ok(((), true))
        })
        .await?;

        info!(job_id = %job_id, "Enqueued job");
        Ok(job_id)
    }

    async fn dequeue(&self) -> QueueResult<Option<LeasedJob>> {
        let span = self.lease_span();

        let leased = self
            .with_records(move |records| {
                let now = Utc::now();
                let Some(record) = records.iter_mut().find(|r| r.is_visible(now)) else {
                    return Ok((None, false));
                };

                if record.lease_token.is_some() {
                    warn!(job_id = %record.job.id, "Reclaiming job with expired lease");
                }

                let token = Uuid::new_v4().to_string();
                let until = now + span;
                record.lease_token = Some(token.clone());
                record.leased_until = Some(until);
                record.deliveries += 1;

                Ok((
                    Some(LeasedJob {
                        job: record.job.clone(),
                        receipt: token,
                        leased_until: until,
                        deliveries: record.deliveries,
                    }),
                    true,
                ))
            })
            .await?;

        if let Some(lease) = &leased {
            debug!(job_id = %lease.job.id, deliveries = lease.deliveries, "Leased job");
        }
        Ok(leased)
    }

    async fn ack(&self, lease: &LeasedJob) -> QueueResult<()> {
        let owned = lease.clone();
        self.with_records(move |records| {
            let pos = records
                .iter()
                .position(|r| r.holds(&owned))
                .ok_or_else(|| QueueError::LeaseLost(owned.job.id.to_string()))?;
            records.remove(pos);
            Ok(((), true))
        })
        .await?;

        debug!(job_id = %lease.job.id, "Acknowledged job");
        Ok(())
    }

    async fn touch(&self, lease: &LeasedJob) -> QueueResult<()> {
        let owned = lease.clone();
        let span = self.lease_span();
        self.with_records(move |records| {
            let record = records
                .iter_mut()
                .find(|r| r.holds(&owned))
                .ok_or_else(|| QueueError::LeaseLost(owned.job.id.to_string()))?;
            record.leased_until = Some(Utc::now() + span);
            Ok(((), true))
        })
        .await
    }

    async fn len(&self) -> QueueResult<u64> {
        self.with_records(|records| Ok((records.len() as u64, false)))
            .await
    }

    async fn check_connectivity(&self) -> QueueResult<()> {
        self.len().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue(dir: &TempDir, timeout: Duration) -> FileJobQueue {
        FileJobQueue::new(dir.path().join("queue_jobs.json"), timeout)
    }

    fn job(url: &str) -> Job {
        Job::new(url)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let dir = TempDir::new().unwrap();
        let q = queue(&dir, Duration::from_secs(60));

        let a = q.enqueue(job("https://example.com/a.mp4")).await.unwrap();
        let b = q.enqueue(job("https://example.com/b.mp4")).await.unwrap();

        let first = q.dequeue().await.unwrap().unwrap();
        assert_eq!(first.job.id, a);
        let second = q.dequeue().await.unwrap().unwrap();
        assert_eq!(second.job.id, b);
        assert!(q.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_set_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let q = queue(&dir, Duration::from_secs(60));
            q.enqueue(job("https://example.com/a.mp4")).await.unwrap()
        };

        let reopened = queue(&dir, Duration::from_secs(60));
        assert_eq!(reopened.len().await.unwrap(), 1);
        let lease = reopened.dequeue().await.unwrap().unwrap();
        assert_eq!(lease.job.id, id);
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let dir = TempDir::new().unwrap();
        let q = queue(&dir, Duration::ZERO);
        let id = q.enqueue(job("https://example.com/a.mp4")).await.unwrap();

        let first = q.dequeue().await.unwrap().unwrap();
        let again = q.dequeue().await.unwrap().unwrap();
        assert_eq!(again.job.id, id);
        assert_eq!(again.deliveries, 2);

        // The first holder lost its lease to the second delivery.
        assert!(matches!(q.ack(&first).await, Err(QueueError::LeaseLost(_))));
        q.ack(&again).await.unwrap();
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_ack_removes_and_touch_extends() {
        let dir = TempDir::new().unwrap();
        let q = queue(&dir, Duration::from_secs(60));
        q.enqueue(job("https://example.com/a.mp4")).await.unwrap();

        let lease = q.dequeue().await.unwrap().unwrap();
        tokio_test::assert_ok!(q.touch(&lease).await);
        assert_eq!(q.len().await.unwrap(), 1);
        assert!(q.dequeue().await.unwrap().is_none());

        q.ack(&lease).await.unwrap();
        assert_eq!(q.len().await.unwrap(), 0);
        assert!(matches!(q.touch(&lease).await, Err(QueueError::LeaseLost(_))));
    }

    #[tokio::test]
    async fn test_reads_minimal_records_and_assigns_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue_jobs.json");
        std::fs::write(
            &path,
            r#"[{"job_id":"legacy-1","video_url":"https://example.com/a.mp4","num_clips":2}]"#,
        )
        .unwrap();
        let q = FileJobQueue::new(&path, Duration::from_secs(60));

        let mut anonymous = job("https://example.com/b.mp4");
        anonymous.id = JobId::from_string("");
        let assigned = q.enqueue(anonymous).await.unwrap();
        assert!(!assigned.is_empty());

        let lease = q.dequeue().await.unwrap().unwrap();
        assert_eq!(lease.job.id.as_str(), "legacy-1");
        assert_eq!(lease.job.num_clips, 2);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let dir = TempDir::new().unwrap();
        let q = queue(&dir, Duration::from_secs(60));
        let mut a = job("https://example.com/a.mp4");
        a.id = JobId::from_string("same");
        let mut b = job("https://example.com/b.mp4");
        b.id = JobId::from_string("same");

        q.enqueue(a).await.unwrap();
        assert!(matches!(q.enqueue(b).await, Err(QueueError::EnqueueFailed(_))));
    }
}
