//! Externally visible job responses.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use clipai_models::{ClipFailure, JobId, OutputLocation, RenderedClip};

use crate::error::WorkerError;
use crate::pipeline::PipelineOutput;

/// One stored clip as reported to callers.
///
/// Exactly one of `video_url`/`video_path` is set, depending on whether the
/// clip went to object storage or stayed on local disk; same for subtitles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipResult {
    pub index: u32,
    pub start: f64,
    pub end: f64,
    pub title: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs_path: Option<String>,
}

/// A candidate that failed to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureResult {
    pub index: u32,
    pub start: f64,
    pub end: f64,
    pub title: String,
    pub error: String,
}

/// Final payload for a job, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResponse {
    Done {
        job_id: JobId,
        clips: Vec<ClipResult>,
        failures: Vec<FailureResult>,
        fallback_used: bool,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        traceback: Option<Vec<String>>,
    },
}

impl JobResponse {
    pub fn is_done(&self) -> bool {
        matches!(self, JobResponse::Done { .. })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|e| json!({"status": "error", "error": e.to_string()}))
    }
}

fn split_location(location: &OutputLocation) -> (Option<String>, Option<String>) {
    match location {
        OutputLocation::Remote { url } => (Some(url.clone()), None),
        OutputLocation::Local { path } => (None, Some(path.clone())),
    }
}

impl From<&RenderedClip> for ClipResult {
    fn from(clip: &RenderedClip) -> Self {
        let (video_url, video_path) = split_location(&clip.video_location);
        let (subs_url, subs_path) = split_location(&clip.subtitle_location);
        let c = &clip.candidate;
        Self {
            index: clip.index,
            start: c.start,
            end: c.end,
            title: c.title.clone(),
            reason: c.reason.clone(),
            hook: c.hook.clone(),
            summary: c.summary.clone(),
            hashtags: c.hashtags.clone(),
            video_url,
            video_path,
            subs_url,
            subs_path,
        }
    }
}

impl From<&ClipFailure> for FailureResult {
    fn from(failure: &ClipFailure) -> Self {
        Self {
            index: failure.index,
            start: failure.candidate.start,
            end: failure.candidate.end,
            title: failure.candidate.title.clone(),
            error: failure.error.clone(),
        }
    }
}

/// Builds [`JobResponse`] payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler {
    include_traceback: bool,
}

impl ResultAssembler {
    pub fn new(include_traceback: bool) -> Self {
        Self { include_traceback }
    }

    pub fn done(&self, output: &PipelineOutput) -> JobResponse {
        JobResponse::Done {
            job_id: output.job_id.clone(),
            clips: output.clips.iter().map(ClipResult::from).collect(),
            failures: output.failures.iter().map(FailureResult::from).collect(),
            fallback_used: output.fallback_used,
        }
    }

    /// Error payload; the traceback is the error's source chain.
    pub fn failed(&self, job_id: Option<&JobId>, error: &WorkerError) -> JobResponse {
        JobResponse::Error {
            job_id: job_id.cloned(),
            error: error.to_string(),
            traceback: self.include_traceback.then(|| error.chain()),
        }
    }

    /// Error payload for failures outside a pipeline run.
    pub fn message(error: impl Into<String>) -> JobResponse {
        JobResponse::Error {
            job_id: None,
            error: error.into(),
            traceback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipai_models::ClipCandidate;

    fn output() -> PipelineOutput {
        let candidate = ClipCandidate::new(10.0, 40.0, "Hook", "Strong opener");
        PipelineOutput {
            job_id: JobId::from_string("job-1"),
            clips: vec![RenderedClip {
                index: 1,
                candidate: candidate.clone(),
                video_location: OutputLocation::Remote {
                    url: "https://cdn.example.com/job-1/short_01.mp4".into(),
                },
                subtitle_location: OutputLocation::Local {
                    path: "/out/job-1/short_01.ass".into(),
                },
            }],
            failures: vec![ClipFailure {
                index: 2,
                candidate,
                error: "ffmpeg exited 1".into(),
            }],
            fallback_used: false,
            elapsed_secs: 3.0,
        }
    }

    #[test]
    fn test_done_payload_shape() {
        let value = ResultAssembler::default().done(&output()).to_value();
        assert_eq!(value["status"], "done");
        assert_eq!(value["job_id"], "job-1");
        let clip = &value["clips"][0];
        assert_eq!(clip["index"], 1);
        assert_eq!(clip["video_url"], "https://cdn.example.com/job-1/short_01.mp4");
        assert!(clip.get("video_path").is_none());
        assert_eq!(clip["subs_path"], "/out/job-1/short_01.ass");
        assert!(clip.get("hook").is_none());
        assert_eq!(value["failures"][0]["error"], "ffmpeg exited 1");
    }

    #[test]
    fn test_error_payload_traceback_toggle() {
        let err = WorkerError::download(clipai_media::MediaError::InvalidUrl("x".into()));

        let plain = ResultAssembler::new(false).failed(None, &err).to_value();
        assert_eq!(plain["status"], "error");
        assert!(plain.get("traceback").is_none());
        assert!(plain.get("job_id").is_none());

        let verbose = ResultAssembler::new(true)
            .failed(Some(&JobId::from_string("j")), &err)
            .to_value();
        assert_eq!(verbose["job_id"], "j");
        assert_eq!(verbose["traceback"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_message_payload() {
        let value = ResultAssembler::message("Missing URL").to_value();
        assert_eq!(value, json!({"status": "error", "error": "Missing URL"}));
    }
}
