//! Mock collaborators shared by the worker's unit tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use clipai_models::{OutputLocation, TranscriptSegment};

use crate::collaborators::{
    Collaborators, MediaSource, MockClipRenderer, MockClipScorer, MockMediaSource, MockObjectStore,
    MockTranscriber,
};
use crate::error::WorkerResult;

pub const VIDEO_SECS: f64 = 120.0;

pub fn transcript() -> Vec<TranscriptSegment> {
    vec![
        TranscriptSegment::new(0.0, 5.0, "hello world"),
        TranscriptSegment::new(5.0, 30.0, "this is the part everybody shares"),
        TranscriptSegment::new(30.0, 60.0, "and then the twist arrives"),
        TranscriptSegment::new(60.0, 95.0, "nobody saw that coming"),
    ]
}

/// Three candidates that pass the default 20/45 bounds.
pub fn three_candidates() -> Vec<Value> {
    vec![
        json!({"start": 0, "end": 30, "title": "Opener", "reason": "strong hook"}),
        json!({"start": "00:00:30", "end": "01:05", "title": "Twist", "reason": "payoff"}),
        json!({"start": 70.0, "end": 100.0, "title": "Reaction", "reason": "emotion",
               "hashtags": ["#shorts"]}),
    ]
}

pub fn media() -> MockMediaSource {
    let mut media = MockMediaSource::new();
    media.expect_fetch().returning(|_, _| Ok(1024));
    media.expect_duration().returning(|_| Ok(VIDEO_SECS));
    media.expect_visual_peaks().returning(|_| Ok(vec![12.5, 48.0]));
    media
}

pub fn transcriber() -> MockTranscriber {
    let mut transcriber = MockTranscriber::new();
    transcriber.expect_transcribe().returning(|_, _| Ok(transcript()));
    transcriber
}

pub fn scorer(raw: Vec<Value>) -> MockClipScorer {
    let mut scorer = MockClipScorer::new();
    scorer.expect_score().returning(move |_| Ok(raw.clone()));
    scorer
}

/// Renderer that echoes the requested output path.
pub fn renderer() -> MockClipRenderer {
    let mut renderer = MockClipRenderer::new();
    renderer.expect_render().returning(|spec| Ok(spec.output.clone()));
    renderer
}

/// Store that reports a public URL per artefact.
pub fn store() -> MockObjectStore {
    let mut store = MockObjectStore::new();
    store.expect_store().returning(|job_id, file| {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        Ok(OutputLocation::Remote {
            url: format!("https://cdn.test/{job_id}/{name}"),
        })
    });
    store
}

pub fn collaborators(raw: Vec<Value>) -> Collaborators {
    Collaborators {
        media: Arc::new(media()),
        transcriber: Arc::new(transcriber()),
        scorer: Arc::new(scorer(raw)),
        renderer: Arc::new(renderer()),
        store: Arc::new(store()),
    }
}

/// A source whose download never finishes.
pub struct StallingSource;

#[async_trait]
impl MediaSource for StallingSource {
    async fn fetch(&self, _url: &str, _dest: &Path) -> WorkerResult<u64> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(0)
    }

    async fn duration(&self, _video: &Path) -> WorkerResult<f64> {
        Ok(VIDEO_SECS)
    }

    async fn visual_peaks(&self, _video: &Path) -> WorkerResult<Vec<f64>> {
        Ok(Vec::new())
    }
}
