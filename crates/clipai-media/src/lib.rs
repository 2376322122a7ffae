//! Media plumbing for the ClipAI engine.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeouts for external processes
//! - HTTP download of source media
//! - Clip-local transcript windowing and per-word karaoke timing
//! - ASS subtitle generation and the vertical 9:16 render
//! - Visual energy analysis used as a scoring hint

pub mod analysis;
pub mod audio;
pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod render;
pub mod subtitles;

pub use analysis::{analyze_visual_energy, detect_peaks, VisualAnalysis};
pub use audio::extract_audio;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::{download_video, validate_source_url, DownloadConfig};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use render::{build_vertical_filter, render_clip, RenderRequest};
pub use subtitles::{build_cues, window_segments, write_ass, AssStyle};
