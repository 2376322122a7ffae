//! Visual energy analysis.
//!
//! Frames are sampled at a low rate, downscaled to grayscale thumbnails and
//! scored by luminance standard deviation. Samples well above the median are
//! reported as peaks, which the scoring oracle receives as a hint.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::command::{check_ffmpeg, wait_for_exit, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Sample frame size; small enough to keep the pipe cheap.
const SAMPLE_WIDTH: usize = 64;
const SAMPLE_HEIGHT: usize = 36;
const FRAME_BYTES: usize = SAMPLE_WIDTH * SAMPLE_HEIGHT;

/// Default samples per second.
pub const DEFAULT_SAMPLE_FPS: f64 = 2.0;
/// A sample is a peak when its energy exceeds this multiple of the median.
pub const PEAK_THRESHOLD_RATIO: f64 = 1.4;

/// Result of a visual energy pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisualAnalysis {
    /// Samples per second of source video
    pub sample_fps: f64,
    /// Energy per sample, in sample order
    pub energy: Vec<f64>,
    /// Peak positions in seconds
    pub peaks: Vec<f64>,
}

/// Standard deviation of 8-bit luminance values.
pub fn frame_energy(pixels: &[u8]) -> f64 {
    if pixels.is_empty() {
        return 0.0;
    }
    let n = pixels.len() as f64;
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / n;
    let var = pixels
        .iter()
        .map(|&p| {
            let d = p as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Indices of values strictly above `median * threshold_ratio`.
pub fn detect_peaks(values: &[f64], threshold_ratio: f64) -> Vec<usize> {
    let threshold = median(values) * threshold_ratio;
    values
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v > threshold)
        .map(|(i, _)| i)
        .collect()
}

fn sampling_command(video: &Path, sample_fps: f64) -> FfmpegCommand {
    FfmpegCommand::new(video, "pipe:1")
        .without_progress()
        .video_filter(format!(
            "fps={sample_fps},scale={SAMPLE_WIDTH}:{SAMPLE_HEIGHT},format=gray"
        ))
        .output_arg("-an")
        .format("rawvideo")
}

/// Sample `video` and compute per-sample energy and peaks.
pub async fn analyze_visual_energy(
    video: impl AsRef<Path>,
    sample_fps: f64,
    runner: &FfmpegRunner,
) -> MediaResult<VisualAnalysis> {
    let video = video.as_ref();
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    if !(sample_fps.is_finite() && sample_fps > 0.0) {
        return Err(MediaError::internal(format!("invalid sample rate {sample_fps}")));
    }
    check_ffmpeg()?;

    let args = sampling_command(video, sample_fps).build_args();
    debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

    let reader = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut frame = vec![0u8; FRAME_BYTES];
        let mut energy = Vec::new();
        while reader.read_exact(&mut frame).await.is_ok() {
            energy.push(frame_energy(&frame));
        }
        energy
    });
    let stderr_reader = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    let exit = wait_for_exit(&mut child, runner.cancel_rx(), None).await;
    let energy = reader.await.unwrap_or_default();
    let stderr_text = stderr_reader.await.unwrap_or_default();

    if let Err(MediaError::FfmpegFailed { exit_code, .. }) = exit {
        return Err(MediaError::ffmpeg_failed(
            "frame sampling failed",
            Some(stderr_text.trim().to_string()).filter(|s| !s.is_empty()),
            exit_code,
        ));
    }
    exit?;

    let peaks = detect_peaks(&energy, PEAK_THRESHOLD_RATIO)
        .into_iter()
        .map(|i| i as f64 / sample_fps)
        .collect::<Vec<_>>();

    info!(samples = energy.len(), peaks = peaks.len(), "Visual energy analysis complete");

    Ok(VisualAnalysis {
        sample_fps,
        energy,
        peaks,
    })
}
