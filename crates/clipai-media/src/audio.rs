//! Audio extraction for transcription uploads.
//!
//! Transcription endpoints cap uploads (25 MB for OpenAI), so the soundtrack
//! is re-encoded to mono 16 kHz MP3 at 64 kbit/s, about 29 MB per hour.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Extract a compact mono audio track from `video` into `output`.
pub async fn extract_audio(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let output = output.as_ref();

    let cmd = audio_command(video, output);
    runner.run(&cmd).await?;

    info!(output = %output.display(), "Extracted audio for transcription");
    Ok(output.to_path_buf())
}

fn audio_command(video: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video, output)
        .no_video()
        .output_args(["-ac", "1", "-ar", "16000"])
        .audio_codec("libmp3lame")
        .audio_bitrate("64k")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_command_args() {
        let args = audio_command(Path::new("in.mp4"), Path::new("audio.mp3")).build_args();
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"libmp3lame".to_string()));
        let ar = args.iter().position(|a| a == "-ar").unwrap();
        assert_eq!(args[ar + 1], "16000");
    }
}
