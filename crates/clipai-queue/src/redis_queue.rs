//! Job queue using Redis Streams.
//!
//! Leases map onto the consumer group's pending entries list: a delivered
//! entry stays pending until XACK, and entries idle for longer than the
//! visibility timeout are claimed by the next consumer that dequeues.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use redis::streams::{StreamClaimReply, StreamPendingCountReply, StreamPendingId, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clipai_models::{Job, JobId};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::lease::{JobQueue, LeasedJob};

/// Redis Streams queue client.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
    consumer_name: String,
}

impl RedisJobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        Ok(Self {
            client,
            config,
            consumer_name,
        })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    fn visibility_ms(&self) -> u64 {
        self.config.visibility_timeout.as_millis() as u64
    }

    fn lease(&self, message_id: String, job: Job, deliveries: u32) -> LeasedJob {
        let span = chrono::Duration::from_std(self.config.visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        LeasedJob {
            job,
            receipt: message_id,
            leased_until: Utc::now() + span,
            deliveries,
        }
    }

    /// Decode a stream entry, acking entries that can never be processed.
    async fn decode(
        &self,
        message_id: &str,
        map: &HashMap<String, redis::Value>,
    ) -> QueueResult<Option<Job>> {
        if let Some(redis::Value::BulkString(payload)) = map.get("job") {
            match serde_json::from_slice::<Job>(payload) {
                Ok(job) => return Ok(Some(job)),
                Err(e) => warn!("Failed to parse job payload {}: {}", message_id, e),
            }
        } else {
            warn!("Stream entry {} has no job payload", message_id);
        }
        self.ack_id(message_id).await?;
        Ok(None)
    }

    /// Claim the oldest entry whose lease lapsed.
    async fn reclaim_expired(&self) -> QueueResult<Option<LeasedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(self.visibility_ms())
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some(expired) = pending.ids.into_iter().next() else {
            return Ok(None);
        };

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg(self.visibility_ms())
            .arg(&expired.id)
            .query_async(&mut conn)
            .await?;

        for entry in claimed.ids {
            if let Some(job) = self.decode(&entry.id, &entry.map).await? {
                warn!(job_id = %job.id, "Reclaimed job with expired lease");
                let deliveries = expired.times_delivered as u32 + 1;
                return Ok(Some(self.lease(entry.id, job, deliveries)));
            }
        }
        Ok(None)
    }

    async fn read_new(&self) -> QueueResult<Option<LeasedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(job) = self.decode(&entry.id, &entry.map).await? {
                    debug!(job_id = %job.id, "Consumed job from stream");
                    return Ok(Some(self.lease(entry.id, job, 1)));
                }
            }
        }
        Ok(None)
    }

    /// Whether this consumer still holds the pending entry.
    async fn owns(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        message_id: &str,
    ) -> QueueResult<bool> {
        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .arg(message_id)
            .arg(1)
            .query_async(conn)
            .await?;
        Ok(held_by(&pending.ids, message_id, &self.consumer_name))
    }

    async fn ack_id(&self, message_id: &str) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let acked: u64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async(&mut conn)
            .await?;

        // Another consumer may hold the entry now; only the owner deletes it.
        if acked > 0 {
            redis::cmd("XDEL")
                .arg(&self.config.stream_name)
                .arg(message_id)
                .query_async::<()>(&mut conn)
                .await?;
        }

        Ok(acked)
    }
}

/// Whether the pending entry `message_id` is held by `consumer`.
fn held_by(pending: &[StreamPendingId], message_id: &str, consumer: &str) -> bool {
    pending
        .iter()
        .any(|entry| entry.id == message_id && entry.consumer == consumer)
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, mut job: Job) -> QueueResult<JobId> {
        if job.id.is_empty() {
            job.id = JobId::new();
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&job)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(job_id = %job.id, message_id = %message_id, "Enqueued job");
        Ok(job.id)
    }

    async fn dequeue(&self) -> QueueResult<Option<LeasedJob>> {
        if let Some(lease) = self.reclaim_expired().await? {
            return Ok(Some(lease));
        }
        self.read_new().await
    }

    async fn ack(&self, lease: &LeasedJob) -> QueueResult<()> {
        // XACK accepts any group member, so check the owner first.
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        if !self.owns(&mut conn, &lease.receipt).await? {
            return Err(QueueError::LeaseLost(lease.job.id.to_string()));
        }
        let acked = self.ack_id(&lease.receipt).await?;
        if acked == 0 {
            return Err(QueueError::LeaseLost(lease.job.id.to_string()));
        }
        debug!(job_id = %lease.job.id, "Acknowledged job");
        Ok(())
    }

    async fn touch(&self, lease: &LeasedJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        if !self.owns(&mut conn, &lease.receipt).await? {
            return Err(QueueError::LeaseLost(lease.job.id.to_string()));
        }

        // Re-claiming our own entry with min-idle 0 resets its idle clock.
        let ids: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg(0)
            .arg(&lease.receipt)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        if ids.is_empty() {
            return Err(QueueError::LeaseLost(lease.job.id.to_string()));
        }
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    async fn check_connectivity(&self) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
