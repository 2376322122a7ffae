//! Queue integration tests through the backend-selecting constructors.

use std::time::Duration;

use clipai_models::{Job, PipelineStage};
use clipai_queue::{JobStatusRecord, QueueBackend, QueueConfig};
use tempfile::TempDir;

fn file_config(dir: &TempDir) -> QueueConfig {
    QueueConfig {
        backend: QueueBackend::File,
        queue_path: dir.path().join("queue_jobs.json"),
        status_dir: dir.path().join("job_status"),
        visibility_timeout: Duration::from_secs(60),
        ..QueueConfig::default()
    }
}

/// A producer and a consumer opened separately share one queue file.
#[tokio::test]
async fn test_file_queue_shared_between_handles() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    let producer = clipai_queue::connect(&config).await.unwrap();
    let consumer = clipai_queue::connect(&config).await.unwrap();
    producer.check_connectivity().await.unwrap();

    let first = producer.enqueue(Job::new("https://example.com/a.mp4")).await.unwrap();
    let second = producer.enqueue(Job::new("https://example.com/b.mp4")).await.unwrap();
    assert_eq!(consumer.len().await.unwrap(), 2);

    let lease = consumer.dequeue().await.unwrap().unwrap();
    assert_eq!(lease.job_id(), &first);
    // A leased job stays stored but is invisible to other consumers.
    let next = producer.dequeue().await.unwrap().unwrap();
    assert_eq!(next.job_id(), &second);
    assert!(consumer.dequeue().await.unwrap().is_none());

    consumer.ack(&lease).await.unwrap();
    producer.ack(&next).await.unwrap();
    assert!(producer.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_file_status_store_from_config() {
    let dir = TempDir::new().unwrap();
    let store = clipai_queue::status_store(&file_config(&dir)).unwrap();
    let job = Job::new("https://example.com/a.mp4");

    store.put(&JobStatusRecord::queued(job.id.clone())).await.unwrap();
    store
        .put(&JobStatusRecord::at_stage(job.id.clone(), PipelineStage::Transcribing))
        .await
        .unwrap();

    let record = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(record.stage, PipelineStage::Transcribing);
    assert!(!record.status.is_terminal());
}

/// End-to-end enqueue, lease and ack against a live Redis.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_backend_roundtrip() {
    dotenvy::dotenv().ok();

    let config = QueueConfig {
        backend: QueueBackend::Redis,
        stream_name: format!("clipai:test:{}", uuid::Uuid::new_v4()),
        ..QueueConfig::from_env()
    };
    let queue = clipai_queue::connect(&config).await.unwrap();
    let status = clipai_queue::status_store(&config).unwrap();
    queue.check_connectivity().await.unwrap();

    let id = queue.enqueue(Job::new("https://example.com/a.mp4")).await.unwrap();
    status.put(&JobStatusRecord::queued(id.clone())).await.unwrap();

    let lease = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(lease.job_id(), &id);
    queue.touch(&lease).await.unwrap();
    queue.ack(&lease).await.unwrap();
    assert!(queue.is_empty().await.unwrap());

    let record = status.get(&id).await.unwrap().unwrap();
    assert_eq!(record.job_id, id);
}
