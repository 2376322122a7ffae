//! Production implementations of the collaborator traits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use clipai_media::analysis::DEFAULT_SAMPLE_FPS;
use clipai_media::fs_utils::move_into;
use clipai_media::{
    analyze_visual_energy, download_video, extract_audio, probe_video, render_clip,
    DownloadConfig, FfmpegRunner, RenderRequest,
};
use clipai_ml_client::{MlClient, ScoringRequest};
use clipai_models::{EncodingConfig, JobId, OutputLocation, TranscriptSegment};
use clipai_storage::{clip_key, content_type_for, R2Client, R2Config};

use crate::collaborators::{
    ClipRenderer, ClipScorer, Collaborators, MediaSource, ObjectStore, RenderSpec, ScoringInput,
    Transcriber,
};
use crate::config::{PipelineConfig, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};

/// HTTP download plus ffprobe/ffmpeg inspection.
pub struct HttpMediaSource {
    download: DownloadConfig,
    runner: FfmpegRunner,
    sample_fps: f64,
}

impl HttpMediaSource {
    pub fn new(download: DownloadConfig, runner: FfmpegRunner) -> Self {
        Self {
            download,
            runner,
            sample_fps: DEFAULT_SAMPLE_FPS,
        }
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        download_video(url, dest, &self.download)
            .await
            .map_err(WorkerError::download)
    }

    async fn duration(&self, video: &Path) -> WorkerResult<f64> {
        let info = probe_video(video).await.map_err(WorkerError::download)?;
        Ok(info.duration)
    }

    async fn visual_peaks(&self, video: &Path) -> WorkerResult<Vec<f64>> {
        let analysis = analyze_visual_energy(video, self.sample_fps, &self.runner).await?;
        Ok(analysis.peaks)
    }
}

/// Audio extraction followed by the transcription endpoint.
pub struct OpenAiTranscriber {
    client: MlClient,
    runner: FfmpegRunner,
}

impl OpenAiTranscriber {
    pub fn new(client: MlClient, runner: FfmpegRunner) -> Self {
        Self { client, runner }
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, video: &Path, work_dir: &Path) -> WorkerResult<Vec<TranscriptSegment>> {
        let audio = work_dir.join("audio.mp3");
        extract_audio(video, &audio, &self.runner)
            .await
            .map_err(WorkerError::transcription)?;
        self.client
            .transcribe(&audio)
            .await
            .map_err(WorkerError::transcription)
    }
}

/// Chat-completions scoring.
pub struct OpenAiScorer {
    client: MlClient,
}

impl OpenAiScorer {
    pub fn new(client: MlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClipScorer for OpenAiScorer {
    async fn score(&self, input: &ScoringInput) -> WorkerResult<Vec<Value>> {
        let request = ScoringRequest {
            segments: &input.segments,
            visual_peaks: &input.visual_peaks,
            num_clips: input.num_clips,
            min_duration: input.min_duration,
            max_duration: input.max_duration,
        };
        Ok(self.client.score_segments(&request).await?)
    }
}

/// FFmpeg vertical render.
pub struct FfmpegRenderer {
    encoding: EncodingConfig,
    runner: FfmpegRunner,
}

impl FfmpegRenderer {
    pub fn new(encoding: EncodingConfig, runner: FfmpegRunner) -> Self {
        Self { encoding, runner }
    }
}

#[async_trait]
impl ClipRenderer for FfmpegRenderer {
    async fn render(&self, spec: &RenderSpec) -> WorkerResult<PathBuf> {
        let request = RenderRequest {
            source: &spec.source,
            start: spec.start,
            end: spec.end,
            subtitles: spec.subtitles.as_deref(),
            output: &spec.output,
            encoding: &self.encoding,
        };
        render_clip(&request, &self.runner)
            .await
            .map_err(|e| WorkerError::render(spec.index, e))
    }
}

/// Upload to R2 under `{job_id}/{file_name}`.
pub struct R2ObjectStore {
    client: R2Client,
}

impl R2ObjectStore {
    pub fn new(client: R2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for R2ObjectStore {
    async fn store(&self, job_id: &JobId, file: &Path) -> WorkerResult<OutputLocation> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WorkerError::upload(format!("no file name in {}", file.display())))?;
        let key = clip_key(job_id, name).map_err(WorkerError::upload)?;
        self.client
            .upload_file(file, &key, content_type_for(name))
            .await
            .map_err(WorkerError::upload)?;
        Ok(OutputLocation::Remote {
            url: self.client.public_url(&key),
        })
    }
}

/// Keep outputs on local disk under `{root}/{job_id}/`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn store(&self, job_id: &JobId, file: &Path) -> WorkerResult<OutputLocation> {
        let dir = self.root.join(job_id.as_str());
        let moved = move_into(file, &dir).await.map_err(WorkerError::upload)?;
        let path = std::path::absolute(&moved).unwrap_or(moved);
        Ok(OutputLocation::Local {
            path: path.display().to_string(),
        })
    }
}

/// Build the production collaborators from the environment.
///
/// Object storage is R2 when any `R2_*` variable is set, local disk otherwise.
pub async fn collaborators_from_env(
    worker: &WorkerConfig,
    pipeline: &PipelineConfig,
) -> WorkerResult<Collaborators> {
    let runner = FfmpegRunner::new();
    let ml = MlClient::from_env()?;

    let store: Arc<dyn ObjectStore> = match R2Config::from_env_optional()? {
        Some(config) => {
            info!(bucket = %config.bucket_name, "Storing outputs in R2");
            let client = R2Client::new(config).await?;
            if let Err(e) = client.check_connectivity().await {
                warn!("R2 bucket not reachable at startup: {}", e);
            }
            Arc::new(R2ObjectStore::new(client))
        }
        None => {
            info!(dir = %worker.output_dir.display(), "R2 not configured, keeping outputs locally");
            Arc::new(LocalObjectStore::new(&worker.output_dir))
        }
    };

    Ok(Collaborators {
        media: Arc::new(HttpMediaSource::new(DownloadConfig::from_env(), runner.clone())),
        transcriber: Arc::new(OpenAiTranscriber::new(ml.clone(), runner.clone())),
        scorer: Arc::new(OpenAiScorer::new(ml)),
        renderer: Arc::new(FfmpegRenderer::new(pipeline.encoding.clone(), runner)),
        store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_moves_into_job_dir() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        tokio::fs::create_dir_all(&scratch).await.unwrap();
        let file = scratch.join("short_01.mp4");
        tokio::fs::write(&file, b"video").await.unwrap();

        let store = LocalObjectStore::new(dir.path().join("outputs"));
        let location = store
            .store(&JobId::from_string("job-1"), &file)
            .await
            .unwrap();

        match location {
            OutputLocation::Local { path } => {
                assert!(path.ends_with("outputs/job-1/short_01.mp4"));
                assert!(Path::new(&path).exists());
            }
            other => panic!("unexpected location: {other:?}"),
        }
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_local_store_missing_file_is_upload_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let result = store
            .store(&JobId::from_string("job-1"), &dir.path().join("missing.mp4"))
            .await;
        assert!(matches!(result, Err(WorkerError::Upload { .. })));
    }
}
