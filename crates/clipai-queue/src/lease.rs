//! Leased FIFO queue contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use clipai_models::{Job, JobId};

use crate::error::QueueResult;

/// A job handed to exactly one consumer until acked or the lease expires.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job: Job,
    /// Opaque token identifying this lease (file lease token or stream message id)
    pub receipt: String,
    /// When the job becomes visible to other consumers again
    pub leased_until: DateTime<Utc>,
    /// How many times the job has been handed out, this lease included
    pub deliveries: u32,
}

impl LeasedJob {
    pub fn job_id(&self) -> &JobId {
        &self.job.id
    }
}

/// FIFO queue with dequeue-with-lease semantics.
///
/// `dequeue` never blocks. A leased job stays stored until `ack`; if the lease
/// lapses without `touch`, the job is handed out again in its FIFO position.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job; assigns an id when the job carries an empty one.
    async fn enqueue(&self, job: Job) -> QueueResult<JobId>;

    /// Lease the oldest visible job, if any.
    async fn dequeue(&self) -> QueueResult<Option<LeasedJob>>;

    /// Remove a leased job for good.
    async fn ack(&self, lease: &LeasedJob) -> QueueResult<()>;

    /// Extend an active lease by the visibility timeout.
    async fn touch(&self, lease: &LeasedJob) -> QueueResult<()>;

    /// Number of stored jobs, leased ones included.
    async fn len(&self) -> QueueResult<u64>;

    async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Cheap reachability check for readiness probes.
    async fn check_connectivity(&self) -> QueueResult<()>;
}
