//! Serverless-style invocation events.
//!
//! An event is `{"input": {...}}` with an optional `task` of `ping`,
//! `process` or `debug_download`. Every outcome, errors included, is a JSON
//! object with a `status` field; nothing is raised to the caller.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use clipai_models::{coerce_seconds, Job};

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::PipelineOrchestrator;
use crate::result::ResultAssembler;

pub const EVENT_DEFAULT_NUM_CLIPS: u32 = 3;
pub const EVENT_DEFAULT_MIN_DURATION: f64 = 6.0;
pub const EVENT_DEFAULT_MAX_DURATION: f64 = 25.0;

/// Parsed event input.
#[derive(Debug, Clone, PartialEq)]
struct EventInput {
    task: String,
    url: Option<String>,
    num_clips: u32,
    min_duration: f64,
    max_duration: f64,
}

fn parse_input(input: &Map<String, Value>) -> WorkerResult<EventInput> {
    let url = ["video_url", "url"]
        .iter()
        .filter_map(|key| input.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string);

    let task = match input.get("task").and_then(Value::as_str).map(str::trim) {
        Some(task) if !task.is_empty() => task.to_string(),
        _ if url.is_some() => "process".to_string(),
        _ => "ping".to_string(),
    };

    let num_clips = match input.get("num_clips") {
        None | Some(Value::Null) => EVENT_DEFAULT_NUM_CLIPS,
        Some(value) => parse_count(value)
            .ok_or_else(|| WorkerError::validation(format!("invalid num_clips: {value}")))?,
    };
    let min_duration = parse_duration(input, "min_duration", EVENT_DEFAULT_MIN_DURATION)?;
    let max_duration = parse_duration(input, "max_duration", EVENT_DEFAULT_MAX_DURATION)?;

    Ok(EventInput {
        task,
        url,
        num_clips,
        min_duration,
        max_duration,
    })
}

fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_duration(input: &Map<String, Value>, key: &str, default: f64) -> WorkerResult<f64> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => coerce_seconds(value)
            .map_err(|e| WorkerError::validation(format!("invalid {key}: {e}"))),
    }
}

/// Answers invocation events with a shared orchestrator.
pub struct InvocationHandler {
    orchestrator: Arc<PipelineOrchestrator>,
}

impl InvocationHandler {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Handle one event.
    pub async fn handle(&self, event: &Value) -> Value {
        let input = match event.get("input") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return ResultAssembler::message("Invalid input payload").to_value(),
        };

        let parsed = match parse_input(&input) {
            Ok(parsed) => parsed,
            Err(e) => {
                return self
                    .orchestrator
                    .assembler()
                    .failed(None, &e)
                    .to_value()
            }
        };
        info!(
            task = %parsed.task,
            url = parsed.url.as_deref().unwrap_or(""),
            num_clips = parsed.num_clips,
            min_duration = parsed.min_duration,
            max_duration = parsed.max_duration,
            "Invocation received"
        );

        match parsed.task.as_str() {
            "ping" => json!({
                "status": "ok",
                "message": "ClipAI Engine Alive",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            "debug_download" => match parsed.url {
                Some(url) => self.debug_download(&url).await,
                None => ResultAssembler::message("Missing URL").to_value(),
            },
            "process" => match &parsed.url {
                Some(url) => self.process(url, &parsed).await,
                None => ResultAssembler::message("Missing URL").to_value(),
            },
            other => ResultAssembler::message(format!("Unknown task: {other}")).to_value(),
        }
    }

    async fn process(&self, url: &str, input: &EventInput) -> Value {
        let mut job = Job::new(url)
            .with_num_clips(input.num_clips)
            .with_durations(input.min_duration, input.max_duration);
        // Nothing cancels a synchronous invocation.
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let assembler = self.orchestrator.assembler();
        match self.orchestrator.run(&mut job, cancel_rx).await {
            Ok(output) => assembler.done(&output).to_value(),
            Err(e) => assembler.failed(Some(&job.id), &e).to_value(),
        }
    }

    /// Download only, keeping the file for inspection.
    async fn debug_download(&self, url: &str) -> Value {
        let dir = self.orchestrator.config().work_dir.join("downloads");
        let dest = dir.join(format!("{}.mp4", Uuid::new_v4()));

        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            self.orchestrator.collaborators().media.fetch(url, &dest).await
        }
        .await;

        match result {
            Ok(size) => {
                let local_path = std::path::absolute(&dest).unwrap_or(dest);
                json!({
                    "status": "downloaded",
                    "local_path": local_path.display().to_string(),
                    "size_bytes": size,
                })
            }
            Err(e) => {
                warn!(url, "Debug download failed: {}", e);
                self.orchestrator.assembler().failed(None, &e).to_value()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::collaborators::{Collaborators, MockMediaSource};
    use crate::config::PipelineConfig;
    use crate::test_support;

    fn handler(dir: &TempDir, collaborators: Collaborators) -> InvocationHandler {
        let config = PipelineConfig {
            work_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        InvocationHandler::new(Arc::new(PipelineOrchestrator::new(config, collaborators)))
    }

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_defaults() {
        let parsed = parse_input(&input(json!({"url": "https://x/a.mp4"}))).unwrap();
        assert_eq!(parsed.task, "process");
        assert_eq!(parsed.num_clips, 3);
        assert_eq!(parsed.min_duration, 6.0);
        assert_eq!(parsed.max_duration, 25.0);

        let parsed = parse_input(&Map::new()).unwrap();
        assert_eq!(parsed.task, "ping");
        assert!(parsed.url.is_none());
    }

    #[test]
    fn test_parse_prefers_video_url_and_accepts_strings() {
        let parsed = parse_input(&input(json!({
            "video_url": "https://x/v.mp4",
            "url": "https://x/u.mp4",
            "num_clips": "5",
            "min_duration": "10",
            "max_duration": 30.5,
        })))
        .unwrap();
        assert_eq!(parsed.url.as_deref(), Some("https://x/v.mp4"));
        assert_eq!(parsed.num_clips, 5);
        assert_eq!(parsed.min_duration, 10.0);
        assert_eq!(parsed.max_duration, 30.5);
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        assert!(parse_input(&input(json!({"num_clips": "many"}))).is_err());
        assert!(parse_input(&input(json!({"num_clips": 2.5}))).is_err());
        assert!(parse_input(&input(json!({"min_duration": true}))).is_err());
    }

    #[tokio::test]
    async fn test_ping() {
        let dir = TempDir::new().unwrap();
        let h = handler(&dir, test_support::collaborators(Vec::new()));
        let reply = h.handle(&json!({"input": {"task": "ping"}})).await;
        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["message"], "ClipAI Engine Alive");
        assert_eq!(reply["version"], env!("CARGO_PKG_VERSION"));

        // No input at all is a ping too.
        assert_eq!(h.handle(&json!({})).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_error_payloads() {
        let dir = TempDir::new().unwrap();
        let h = handler(&dir, test_support::collaborators(Vec::new()));

        let reply = h.handle(&json!({"input": "nope"})).await;
        assert_eq!(reply, json!({"status": "error", "error": "Invalid input payload"}));

        let reply = h.handle(&json!({"input": {"task": "process"}})).await;
        assert_eq!(reply["error"], "Missing URL");

        let reply = h.handle(&json!({"input": {"task": "debug_download"}})).await;
        assert_eq!(reply["error"], "Missing URL");

        let reply = h.handle(&json!({"input": {"task": "explode"}})).await;
        assert_eq!(reply["error"], "Unknown task: explode");
    }

    #[tokio::test]
    async fn test_process_event() {
        let dir = TempDir::new().unwrap();
        let h = handler(&dir, test_support::collaborators(test_support::three_candidates()));
        let reply = h
            .handle(&json!({"input": {
                "url": "https://example.com/talk.mp4",
                "min_duration": 20,
                "max_duration": 45,
            }}))
            .await;

        assert_eq!(reply["status"], "done");
        let clips = reply["clips"].as_array().unwrap();
        assert_eq!(clips.len(), 3);
        assert_eq!(clips[0]["index"], 1);
        assert!(clips[0]["video_url"].as_str().unwrap().ends_with("/short_01.mp4"));
        assert!(clips[0]["subs_url"].as_str().unwrap().ends_with("/short_01.ass"));
        assert_eq!(reply["fallback_used"], false);
    }

    #[tokio::test]
    async fn test_debug_download() {
        let dir = TempDir::new().unwrap();
        let mut media = MockMediaSource::new();
        media
            .expect_fetch()
            .withf(|url, _| url == "https://example.com/a.mp4")
            .returning(|_, dest| {
                std::fs::write(dest, b"0123456789").unwrap();
                Ok(10)
            });
        let collaborators = Collaborators {
            media: Arc::new(media),
            ..test_support::collaborators(Vec::new())
        };
        let h = handler(&dir, collaborators);

        let reply = h
            .handle(&json!({"input": {"task": "debug_download", "video_url": "https://example.com/a.mp4"}}))
            .await;
        assert_eq!(reply["status"], "downloaded");
        assert_eq!(reply["size_bytes"], 10);
        let path = reply["local_path"].as_str().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"0123456789");
    }
}
