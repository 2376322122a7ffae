//! Vertical 9:16 clip render with burned-in subtitles.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use clipai_models::encoding::{OUTPUT_HEIGHT, OUTPUT_WIDTH};
use clipai_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Shortest clip FFmpeg is asked to produce, in seconds.
const MIN_RENDER_SECS: f64 = 0.5;

/// One clip render.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub source: &'a Path,
    /// Window start on the source timeline (seconds)
    pub start: f64,
    /// Window end on the source timeline (seconds)
    pub end: f64,
    /// ASS script to burn in; `None` renders without subtitles
    pub subtitles: Option<&'a Path>,
    pub output: &'a Path,
    pub encoding: &'a EncodingConfig,
}

/// Quote a path for the `subtitles` filter argument.
fn quote_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let escaped = raw.replace(':', "\\:").replace('\'', "'\\''");
    format!("'{escaped}'")
}

/// Fill a 1080x1920 frame from any source aspect ratio, then burn subtitles.
pub fn build_vertical_filter(subtitles: Option<&Path>) -> String {
    let mut filter = format!(
        "scale={OUTPUT_WIDTH}:{OUTPUT_HEIGHT}:force_original_aspect_ratio=increase,crop={OUTPUT_WIDTH}:{OUTPUT_HEIGHT}"
    );
    if let Some(subs) = subtitles {
        filter.push_str(",subtitles=");
        filter.push_str(&quote_filter_path(subs));
    }
    filter
}

fn render_command(req: &RenderRequest<'_>) -> FfmpegCommand {
    let duration = (req.end - req.start).max(MIN_RENDER_SECS);
    FfmpegCommand::new(req.source, req.output)
        .seek(req.start.max(0.0))
        .duration(duration)
        .video_filter(build_vertical_filter(req.subtitles))
        .encoding(req.encoding)
        .output_args(["-movflags", "+faststart"])
}

/// Render one clip. Returns the output path.
pub async fn render_clip(req: &RenderRequest<'_>, runner: &FfmpegRunner) -> MediaResult<PathBuf> {
    if !req.source.exists() {
        return Err(MediaError::FileNotFound(req.source.to_path_buf()));
    }
    if !(req.start.is_finite() && req.end.is_finite()) || req.end <= req.start {
        return Err(MediaError::internal(format!(
            "invalid render window {:.3}-{:.3}",
            req.start, req.end
        )));
    }
    if let Some(parent) = req.output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let total_ms = ((req.end - req.start) * 1000.0) as i64;
    let output_name = req.output.display().to_string();
    let cmd = render_command(req);

    runner
        .run_with_progress(&cmd, move |progress| {
            debug!(
                output = %output_name,
                percent = %format!("{:.0}", progress.percentage(total_ms)),
                speed = progress.speed,
                "Render progress"
            );
        })
        .await?;

    if !req.output.exists() {
        return Err(MediaError::ffmpeg_failed("FFmpeg produced no output file", None, None));
    }

    info!(
        output = %req.output.display(),
        start = req.start,
        end = req.end,
        codec = %req.encoding.codec,
        "Rendered clip"
    );
    Ok(req.output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_filter_with_subtitles() {
        let filter = build_vertical_filter(Some(Path::new("/tmp/job/short_01.ass")));
        assert_eq!(
            filter,
            "scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,subtitles='/tmp/job/short_01.ass'"
        );
    }

    #[test]
    fn test_vertical_filter_without_subtitles() {
        assert!(!build_vertical_filter(None).contains("subtitles"));
    }

    #[test]
    fn test_filter_path_quoting() {
        assert_eq!(quote_filter_path(Path::new("C:\\work\\a.ass")), "'C\\:/work/a.ass'");
        assert_eq!(quote_filter_path(Path::new("/tmp/it's.ass")), "'/tmp/it'\\''s.ass'");
    }

    #[test]
    fn test_render_command_window() {
        let encoding = EncodingConfig::default();
        let req = RenderRequest {
            source: Path::new("source.mp4"),
            start: 12.0,
            end: 34.5,
            subtitles: Some(Path::new("short_01.ass")),
            output: Path::new("short_01.mp4"),
            encoding: &encoding,
        };
        let args = render_command(&req).build_args();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "22.500");
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "12.000");
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"160k".to_string()));
    }

    #[tokio::test]
    async fn test_render_missing_source() {
        let encoding = EncodingConfig::default();
        let req = RenderRequest {
            source: Path::new("/nonexistent/source.mp4"),
            start: 0.0,
            end: 10.0,
            subtitles: None,
            output: Path::new("/tmp/out.mp4"),
            encoding: &encoding,
        };
        let result = render_clip(&req, &FfmpegRunner::new()).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
