//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

use clipai_queue::{JobQueue, LeasedJob, QueueError};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::pipeline::PipelineOrchestrator;

/// Back-off after a queue error.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// How long cancelled jobs get to unwind after the drain deadline.
const CANCEL_GRACE: Duration = Duration::from_secs(5);
/// Shortest lease heartbeat period.
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Heartbeat period actually used for a configured interval.
pub fn heartbeat_period(configured: Duration) -> Duration {
    configured.max(MIN_HEARTBEAT)
}

/// Pulls jobs off the queue and runs them on a bounded pool.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<PipelineOrchestrator>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    /// Fired when the drain deadline passes; every running job watches it.
    cancel_jobs: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<PipelineOrchestrator>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let (cancel_jobs, _) = watch::channel(false);

        Self {
            config,
            queue,
            orchestrator,
            job_semaphore,
            shutdown,
            cancel_jobs,
        }
    }

    /// Poll until shutdown, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor with {} max concurrent jobs",
            self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                _ = self.poll_cycle() => {}
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight(),
                "Drain deadline passed, cancelling running jobs"
            );
            let _ = self.cancel_jobs.send(true);
            let _ = tokio::time::timeout(CANCEL_GRACE, self.wait_for_jobs()).await;
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// One poll, then a sleep when there was nothing to start.
    async fn poll_cycle(&self) {
        match self.poll_once().await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
            Err(e) => {
                error!("Error polling queue: {}", e);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }

    /// Start at most one job. Returns whether a job was started.
    pub async fn poll_once(&self) -> WorkerResult<bool> {
        let Ok(permit) = Arc::clone(&self.job_semaphore).try_acquire_owned() else {
            return Ok(false);
        };
        let Some(lease) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        debug!(job_id = %lease.job_id(), deliveries = lease.deliveries, "Leased job");
        let queue = Arc::clone(&self.queue);
        let orchestrator = Arc::clone(&self.orchestrator);
        let heartbeat_every = self.config.job_heartbeat_interval;
        let cancel = self.cancel_jobs.subscribe();

        tokio::spawn(async move {
            Self::execute_job(queue, orchestrator, lease, heartbeat_every, cancel, permit).await;
        });
        Ok(true)
    }

    /// Run one leased job to a terminal state and settle its lease.
    async fn execute_job(
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<PipelineOrchestrator>,
        lease: LeasedJob,
        heartbeat_every: Duration,
        cancel: watch::Receiver<bool>,
        permit: OwnedSemaphorePermit,
    ) {
        let _permit = permit;
        let job_id = lease.job_id().clone();
        let mut job = lease.job.clone();
        info!(job_id = %job_id, deliveries = lease.deliveries, "Executing job");

        let heartbeat = tokio::spawn(
            Self::heartbeat(Arc::clone(&queue), lease.clone(), heartbeat_every)
                .instrument(tracing::debug_span!("lease_heartbeat", job_id = %job_id)),
        );

        metrics::job_started();
        let started = Instant::now();
        let result = orchestrator.run(&mut job, cancel).await;
        heartbeat.abort();
        metrics::job_finished();
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(output) => {
                metrics::record_job("done", elapsed);
                info!(
                    job_id = %job_id,
                    clips = output.clips.len(),
                    failures = output.failures.len(),
                    "Job {} completed successfully", job_id
                );
            }
            Err(e) if e.is_cancelled() => {
                metrics::record_job("cancelled", elapsed);
                warn!(job_id = %job_id, "Job {} cancelled, lease left to expire", job_id);
                return;
            }
            Err(e) => {
                metrics::record_job("failed", elapsed);
                error!(job_id = %job_id, "Job {} failed: {}", job_id, e);
            }
        }

        if let Err(e) = queue.ack(&lease).await {
            error!(job_id = %job_id, "Failed to ack job {}: {}", job_id, e);
        }
    }

    /// Keep extending the lease until aborted or the lease is gone.
    async fn heartbeat(queue: Arc<dyn JobQueue>, lease: LeasedJob, every: Duration) {
        let mut interval = tokio::time::interval(heartbeat_period(every));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match queue.touch(&lease).await {
                Ok(()) => debug!("Lease extended"),
                Err(e @ QueueError::LeaseLost(_)) => {
                    warn!("Stopping heartbeat: {}", e);
                    break;
                }
                Err(e) => warn!("Lease heartbeat failed: {}", e),
            }
        }
    }

    fn in_flight(&self) -> usize {
        self.config
            .max_concurrent_jobs
            .saturating_sub(self.job_semaphore.available_permits())
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipai_models::Job;
    use clipai_queue::{FileJobQueue, FileStatusStore, StatusStore};
    use tempfile::TempDir;

    use crate::collaborators::Collaborators;
    use crate::config::PipelineConfig;
    use crate::test_support;

    struct Fixture {
        _dir: TempDir,
        queue: Arc<FileJobQueue>,
        status: Arc<FileStatusStore>,
        executor: Arc<JobExecutor>,
    }

    fn fixture(collaborators: Collaborators, config: WorkerConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(FileJobQueue::new(
            dir.path().join("queue.json"),
            Duration::from_secs(60),
        ));
        let status = Arc::new(FileStatusStore::new(dir.path().join("status")));
        let pipeline = PipelineConfig {
            work_dir: dir.path().join("work"),
            ..PipelineConfig::default()
        };
        let orchestrator = Arc::new(
            PipelineOrchestrator::new(pipeline, collaborators).with_status_store(status.clone()),
        );
        let executor = Arc::new(JobExecutor::new(config, queue.clone(), orchestrator));
        Fixture {
            _dir: dir,
            queue,
            status,
            executor,
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(10),
            ..WorkerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_executor_runs_and_acks_jobs() {
        let fx = fixture(
            test_support::collaborators(test_support::three_candidates()),
            fast_config(),
        );
        let first = fx.queue.enqueue(Job::new("https://example.com/a.mp4")).await.unwrap();
        let second = fx.queue.enqueue(Job::new("https://example.com/b.mp4")).await.unwrap();

        let executor = Arc::clone(&fx.executor);
        let runner = tokio::spawn(async move { executor.run().await });

        let mut drained = false;
        for _ in 0..200 {
            if fx.queue.is_empty().await.unwrap() {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        fx.executor.shutdown();
        runner.await.unwrap().unwrap();

        assert!(drained, "queue was not drained");
        for id in [first, second] {
            let record = fx.status.get(&id).await.unwrap().unwrap();
            assert_eq!(record.result.unwrap()["status"], "done");
        }
    }

    #[tokio::test]
    async fn test_failed_job_is_acked() {
        let fx = fixture(test_support::collaborators(Vec::new()), fast_config());
        // Validation failure: min above max.
        let job = Job::new("https://example.com/a.mp4").with_durations(50.0, 10.0);
        let id = fx.queue.enqueue(job).await.unwrap();

        assert!(fx.executor.poll_once().await.unwrap());
        fx.executor.wait_for_jobs().await;

        assert!(fx.queue.is_empty().await.unwrap());
        let record = fx.status.get(&id).await.unwrap().unwrap();
        assert_eq!(record.result.unwrap()["status"], "error");
    }

    #[tokio::test]
    async fn test_poll_respects_pool_size() {
        let collaborators = Collaborators {
            media: Arc::new(test_support::StallingSource),
            ..test_support::collaborators(Vec::new())
        };
        let config = WorkerConfig {
            max_concurrent_jobs: 1,
            ..fast_config()
        };
        let fx = fixture(collaborators, config);
        fx.queue.enqueue(Job::new("https://example.com/a.mp4")).await.unwrap();
        fx.queue.enqueue(Job::new("https://example.com/b.mp4")).await.unwrap();

        assert!(fx.executor.poll_once().await.unwrap());
        assert!(!fx.executor.poll_once().await.unwrap());
        assert_eq!(fx.executor.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_stalled_job_without_ack() {
        let collaborators = Collaborators {
            media: Arc::new(test_support::StallingSource),
            ..test_support::collaborators(Vec::new())
        };
        let config = WorkerConfig {
            shutdown_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let fx = fixture(collaborators, config);
        let id = fx.queue.enqueue(Job::new("https://example.com/a.mp4")).await.unwrap();

        let executor = Arc::clone(&fx.executor);
        let runner = tokio::spawn(async move { executor.run().await });
        for _ in 0..100 {
            if fx.executor.in_flight() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        fx.executor.shutdown();
        runner.await.unwrap().unwrap();

        assert_eq!(fx.executor.in_flight(), 0);
        // Still stored for redelivery once the lease lapses.
        assert_eq!(fx.queue.len().await.unwrap(), 1);
        let record = fx.status.get(&id).await.unwrap().unwrap();
        assert!(!record.status.is_terminal());
    }

    #[test]
    fn test_heartbeat_period_floor() {
        assert_eq!(heartbeat_period(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(heartbeat_period(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_zero_heartbeat_keeps_running() {
        let dir = TempDir::new().unwrap();
        let queue: Arc<dyn JobQueue> = Arc::new(FileJobQueue::new(
            dir.path().join("queue.json"),
            Duration::from_secs(60),
        ));
        queue.enqueue(Job::new("https://example.com/a.mp4")).await.unwrap();
        let lease = queue.dequeue().await.unwrap().unwrap();

        let task = tokio::spawn(JobExecutor::heartbeat(queue, lease, Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        task.abort();
    }
}
