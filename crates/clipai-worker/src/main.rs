//! Clip pipeline worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use clipai_queue::QueueConfig;
use clipai_worker::executor::heartbeat_period;
use clipai_worker::logging::init_tracing;
use clipai_worker::metrics::init_metrics;
use clipai_worker::{
    collaborators_from_env, JobExecutor, PipelineConfig, PipelineOrchestrator, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting clipai-worker v{}", env!("CARGO_PKG_VERSION"));

    let worker_config = WorkerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!("Worker config: {:?}", worker_config);
    let heartbeat = heartbeat_period(worker_config.job_heartbeat_interval);
    if heartbeat >= queue_config.visibility_timeout {
        warn!(
            heartbeat_secs = heartbeat.as_secs(),
            visibility_timeout_secs = queue_config.visibility_timeout.as_secs(),
            "Lease heartbeat is not shorter than the visibility timeout; running jobs may be redelivered"
        );
    }
    info!("Pipeline config: {:?}", pipeline_config);

    if let Some(port) = worker_config.metrics_port {
        init_metrics(port)?;
        info!(port, "Serving Prometheus metrics");
    }

    let queue = clipai_queue::connect(&queue_config)
        .await
        .context("failed to connect to job queue")?;
    let status = clipai_queue::status_store(&queue_config).context("failed to open status store")?;
    let collaborators = collaborators_from_env(&worker_config, &pipeline_config)
        .await
        .context("failed to build pipeline collaborators")?;

    let orchestrator = Arc::new(
        PipelineOrchestrator::new(pipeline_config, collaborators).with_status_store(status),
    );
    let executor = Arc::new(JobExecutor::new(worker_config, queue, orchestrator));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}
