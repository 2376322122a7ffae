//! Per-job pipeline orchestration.
//!
//! One run drives a job through
//! `Downloading → Transcribing → Selecting → Rendering → Uploading → Done`,
//! moving to `Failed` on the first unrecovered error. Every collaborator call
//! is bounded by its stage timeout and aborted when the job's cancel channel
//! fires; dropping an in-flight ffmpeg future kills the child process.
//!
//! Scratch files live in a per-job [`tempfile::TempDir`] that is removed on
//! every exit path.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn, Instrument};

use clipai_media::command::cancelled;
use clipai_media::{build_cues, window_segments, write_ass, AssStyle};
use clipai_models::{
    ClipCandidate, ClipFailure, Job, JobId, JobStatus, PipelineStage, RenderedClip,
    TranscriptSegment,
};
use clipai_queue::{JobStatusRecord, StatusStore};

use crate::collaborators::{Collaborators, RenderSpec, ScoringInput};
use crate::config::{PipelineConfig, RenderFailurePolicy};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::result::ResultAssembler;
use crate::selection::{resolve, validate_candidates, SelectionConstraints};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub job_id: JobId,
    /// Stored clips in index order
    pub clips: Vec<RenderedClip>,
    /// Candidates whose render failed under the isolate policy
    pub failures: Vec<ClipFailure>,
    /// Whether the windows came from the fallback partition
    pub fallback_used: bool,
    pub elapsed_secs: f64,
}

/// A clip that rendered but is not stored yet.
struct LocalClip {
    index: u32,
    candidate: ClipCandidate,
    video: PathBuf,
    subtitles: PathBuf,
}

/// One in-flight candidate render.
type RenderFuture<'a> =
    Pin<Box<dyn Future<Output = (u32, &'a ClipCandidate, WorkerResult<LocalClip>)> + Send + 'a>>;

/// Output file names for clip `index`.
pub fn clip_file_names(index: u32) -> (String, String) {
    (format!("short_{index:02}.mp4"), format!("short_{index:02}.ass"))
}

/// Run `fut` under a stage timeout, giving up early on cancellation.
async fn guard<T, F>(
    stage: PipelineStage,
    limit: Duration,
    cancel: &watch::Receiver<bool>,
    fut: F,
) -> WorkerResult<T>
where
    F: Future<Output = WorkerResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancelled(Some(cancel.clone())) => Err(WorkerError::Cancelled),
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(WorkerError::timeout(stage, limit.as_secs())),
        },
    }
}

/// Stage state machine plus status publication for one run.
struct StageTracker {
    job_id: JobId,
    stage: PipelineStage,
    entered: Instant,
    logger: JobLogger,
    status: Option<Arc<dyn StatusStore>>,
}

impl StageTracker {
    fn new(job_id: &JobId, status: Option<Arc<dyn StatusStore>>) -> Self {
        Self {
            job_id: job_id.clone(),
            stage: PipelineStage::Queued,
            entered: Instant::now(),
            logger: JobLogger::new(job_id),
            status,
        }
    }

    fn transition(&mut self, next: PipelineStage) -> WorkerResult<()> {
        if !self.stage.can_transition_to(next) {
            return Err(WorkerError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        metrics::record_stage_duration(self.stage.as_str(), self.entered.elapsed().as_secs_f64());
        self.stage = next;
        self.entered = Instant::now();
        self.logger.set_stage(next);
        Ok(())
    }

    /// Move to a working stage and publish it.
    async fn enter(&mut self, next: PipelineStage) -> WorkerResult<()> {
        self.transition(next)?;
        self.logger.log_progress(&format!("entering {next}"));
        self.publish(JobStatusRecord::at_stage(self.job_id.clone(), next))
            .await;
        Ok(())
    }

    /// Move to a terminal stage and publish the final payload.
    async fn finish(&mut self, stage: PipelineStage, payload: serde_json::Value, error: Option<String>) {
        if let Err(e) = self.transition(stage) {
            warn!(job_id = %self.job_id, "Could not record terminal stage: {}", e);
            return;
        }
        let mut record = JobStatusRecord::at_stage(self.job_id.clone(), stage).with_result(payload);
        if let Some(error) = error {
            record = record.with_error(error);
        }
        self.publish(record).await;
    }

    async fn publish(&self, record: JobStatusRecord) {
        let Some(store) = &self.status else {
            return;
        };
        if let Err(e) = store.put(&record).await {
            self.logger
                .log_warning(&format!("failed to write status record: {e}"));
        }
    }
}

/// Drives jobs through the pipeline with a fixed set of collaborators.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    collaborators: Collaborators,
    status: Option<Arc<dyn StatusStore>>,
    subtitle_style: AssStyle,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            status: None,
            subtitle_style: AssStyle::default(),
        }
    }

    /// Publish stage changes and final payloads to `store`.
    pub fn with_status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.status = Some(store);
        self
    }

    pub fn with_subtitle_style(mut self, style: AssStyle) -> Self {
        self.subtitle_style = style;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn assembler(&self) -> ResultAssembler {
        ResultAssembler::new(self.config.include_traceback)
    }

    /// Run one job to a terminal state.
    ///
    /// The job's status moves to `Processing` and then `Done` or `Failed`.
    /// A cancelled run leaves no terminal record so the job can be picked up
    /// again.
    pub async fn run(&self, job: &mut Job, cancel: watch::Receiver<bool>) -> WorkerResult<PipelineOutput> {
        job.transition(JobStatus::Processing)
            .map_err(|e| WorkerError::validation(e.to_string()))?;
        let mut tracker = StageTracker::new(&job.id, self.status.clone());
        let span = tracker.logger.create_span();

        async {
            tracker.logger.log_start(&job.source_url);

            let started = Instant::now();
            let result = self.drive(job, &mut tracker, &cancel).await;
            let assembler = self.assembler();

            match &result {
                Ok(output) => {
                    tracker
                        .finish(PipelineStage::Done, assembler.done(output).to_value(), None)
                        .await;
                    mark(job, JobStatus::Done);
                    tracker.logger.log_completion(&format!(
                        "{} clips, {} failures in {:.1}s",
                        output.clips.len(),
                        output.failures.len(),
                        started.elapsed().as_secs_f64()
                    ));
                }
                Err(e) if e.is_cancelled() => {
                    tracker.logger.log_warning("cancelled");
                }
                Err(e) => {
                    tracker
                        .finish(
                            PipelineStage::Failed,
                            assembler.failed(Some(&job.id), e).to_value(),
                            Some(e.to_string()),
                        )
                        .await;
                    mark(job, JobStatus::Failed);
                    tracker.logger.log_error(&e.to_string());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        job: &Job,
        tracker: &mut StageTracker,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<PipelineOutput> {
        validate_job(job)?;
        let started = Instant::now();
        let timeouts = &self.config.timeouts;
        let c = &self.collaborators;

        tracker.enter(PipelineStage::Downloading).await?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let work = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job.id))
            .tempdir_in(&self.config.work_dir)?;
        let source = work.path().join("source.mp4");

        let bytes = guard(
            PipelineStage::Downloading,
            timeouts.download,
            cancel,
            c.media.fetch(&job.source_url, &source),
        )
        .await?;
        let total_duration = guard(
            PipelineStage::Downloading,
            timeouts.download,
            cancel,
            c.media.duration(&source),
        )
        .await?;
        tracker.logger.log_progress(&format!(
            "downloaded {bytes} bytes, {total_duration:.1}s of video"
        ));

        tracker.enter(PipelineStage::Transcribing).await?;
        let segments = guard(
            PipelineStage::Transcribing,
            timeouts.transcribe,
            cancel,
            c.transcriber.transcribe(&source, work.path()),
        )
        .await?;
        tracker
            .logger
            .log_progress(&format!("{} transcript segments", segments.len()));

        tracker.enter(PipelineStage::Selecting).await?;
        let (candidates, fallback_used) = self
            .select(job, &source, segments.clone(), total_duration, tracker, cancel)
            .await?;

        tracker.enter(PipelineStage::Rendering).await?;
        let (rendered, failures) = self
            .render_all(&candidates, &source, work.path(), &segments, cancel)
            .await?;

        tracker.enter(PipelineStage::Uploading).await?;
        let mut clips = Vec::with_capacity(rendered.len());
        for local in rendered {
            let video_location = guard(
                PipelineStage::Uploading,
                timeouts.upload,
                cancel,
                c.store.store(&job.id, &local.video),
            )
            .await?;
            let subtitle_location = guard(
                PipelineStage::Uploading,
                timeouts.upload,
                cancel,
                c.store.store(&job.id, &local.subtitles),
            )
            .await?;
            clips.push(RenderedClip {
                index: local.index,
                candidate: local.candidate,
                video_location,
                subtitle_location,
            });
        }

        Ok(PipelineOutput {
            job_id: job.id.clone(),
            clips,
            failures,
            fallback_used,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Score, validate, and fall back when nothing usable came back.
    async fn select(
        &self,
        job: &Job,
        source: &Path,
        segments: Vec<TranscriptSegment>,
        total_duration: f64,
        tracker: &StageTracker,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<(Vec<ClipCandidate>, bool)> {
        let limit = self.config.timeouts.select;
        let c = &self.collaborators;

        let visual_peaks = match guard(PipelineStage::Selecting, limit, cancel, c.media.visual_peaks(source)).await {
            Ok(peaks) => peaks,
            Err(WorkerError::Cancelled) => return Err(WorkerError::Cancelled),
            Err(e) => {
                tracker
                    .logger
                    .log_warning(&format!("visual analysis skipped: {e}"));
                Vec::new()
            }
        };

        let input = ScoringInput {
            segments,
            visual_peaks,
            num_clips: job.num_clips,
            min_duration: job.min_duration,
            max_duration: job.max_duration,
        };
        let raw = match guard(PipelineStage::Selecting, limit, cancel, c.scorer.score(&input)).await {
            Ok(raw) => raw,
            Err(WorkerError::Cancelled) => return Err(WorkerError::Cancelled),
            Err(e) => {
                tracker
                    .logger
                    .log_warning(&format!("scoring failed, using fallback windows: {e}"));
                Vec::new()
            }
        };

        let constraints = SelectionConstraints {
            num_clips: job.num_clips,
            min_duration: job.min_duration,
            max_duration: job.max_duration,
            total_duration,
        };
        let outcome = validate_candidates(&raw, &constraints, &self.config.selection);
        let (candidates, fallback_used) = resolve(outcome, &constraints);
        if candidates.is_empty() {
            return Err(WorkerError::selection(format!(
                "no usable candidates and {total_duration:.1}s of video is shorter than the {:.1}s minimum",
                job.min_duration
            )));
        }
        if fallback_used {
            tracker.logger.log_warning(&format!(
                "no valid candidates among {}, using {} fallback windows",
                raw.len(),
                candidates.len()
            ));
        } else {
            tracker.logger.log_progress(&format!(
                "{} of {} candidates accepted",
                candidates.len(),
                raw.len()
            ));
        }
        Ok((candidates, fallback_used))
    }

    /// Render every candidate, at most `render_concurrency` at a time.
    async fn render_all(
        &self,
        candidates: &[ClipCandidate],
        source: &Path,
        work_dir: &Path,
        segments: &[TranscriptSegment],
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<(Vec<LocalClip>, Vec<ClipFailure>)> {
        // Boxed eagerly so the job future stays `Send` for `tokio::spawn`.
        let mut jobs: Vec<RenderFuture<'_>> = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let index = i as u32 + 1;
            jobs.push(Box::pin(async move {
                let result = self
                    .render_one(index, candidate, source, work_dir, segments, cancel)
                    .await;
                (index, candidate, result)
            }));
        }
        let mut renders =
            stream::iter(jobs).buffer_unordered(self.config.render_concurrency.max(1));

        let mut rendered = Vec::new();
        let mut failures = Vec::new();
        while let Some((index, candidate, result)) = renders.next().await {
            match result {
                Ok(local) => {
                    metrics::record_clip_rendered();
                    rendered.push(local);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    metrics::record_render_failure();
                    if self.config.render_failure_policy == RenderFailurePolicy::Abort {
                        return Err(e);
                    }
                    warn!(index, error = %e, "Clip render failed, continuing with the rest");
                    failures.push(ClipFailure {
                        index,
                        candidate: candidate.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        rendered.sort_by_key(|c| c.index);
        failures.sort_by_key(|f| f.index);

        if rendered.is_empty() {
            let (index, first) = failures
                .first()
                .map(|f| (f.index, f.error.clone()))
                .unwrap_or((0, "no candidates".to_string()));
            return Err(WorkerError::render_msg(
                index,
                format!("all {} clip renders failed; first error: {}", candidates.len(), first),
            ));
        }
        Ok((rendered, failures))
    }

    async fn render_one(
        &self,
        index: u32,
        candidate: &ClipCandidate,
        source: &Path,
        work_dir: &Path,
        segments: &[TranscriptSegment],
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<LocalClip> {
        let (video_name, subs_name) = clip_file_names(index);
        let subs_path = work_dir.join(subs_name);

        let local = window_segments(segments, candidate.start, candidate.end);
        let cues = build_cues(&local);
        write_ass(&subs_path, &cues, &self.subtitle_style)
            .await
            .map_err(|e| WorkerError::render(index, e))?;
        debug!(index, cues = cues.len(), "Wrote subtitles");

        let spec = RenderSpec {
            index,
            source: source.to_path_buf(),
            start: candidate.start,
            end: candidate.end,
            subtitles: (!cues.is_empty()).then(|| subs_path.clone()),
            output: work_dir.join(video_name),
        };
        let video = guard(
            PipelineStage::Rendering,
            self.config.timeouts.render,
            cancel,
            self.collaborators.renderer.render(&spec),
        )
        .await?;

        Ok(LocalClip {
            index,
            candidate: candidate.clone(),
            video,
            subtitles: subs_path,
        })
    }
}

fn mark(job: &mut Job, status: JobStatus) {
    if let Err(e) = job.transition(status) {
        warn!(job_id = %job.id, "{}", e);
    }
}

/// Reject jobs the pipeline cannot run.
pub fn validate_job(job: &Job) -> WorkerResult<()> {
    if job.source_url.trim().is_empty() {
        return Err(WorkerError::validation("missing source URL"));
    }
    if job.num_clips == 0 {
        return Err(WorkerError::validation("num_clips must be at least 1"));
    }
    let finite = job.min_duration.is_finite() && job.max_duration.is_finite();
    if !finite || job.min_duration <= 0.0 || job.max_duration <= 0.0 {
        return Err(WorkerError::validation("clip durations must be positive"));
    }
    if job.min_duration > job.max_duration {
        return Err(WorkerError::validation(format!(
            "min_duration {} exceeds max_duration {}",
            job.min_duration, job.max_duration
        )));
    }
    Ok(())
}
