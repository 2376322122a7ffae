//! Video encoding configuration for rendered clips.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// NVIDIA hardware H.264 encoder
pub const NVENC_VIDEO_CODEC: &str = "h264_nvenc";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset for libx264
pub const DEFAULT_PRESET: &str = "veryfast";
/// Default preset for NVENC
pub const NVENC_PRESET: &str = "p4";
/// Default CRF for libx264
pub const DEFAULT_CRF: u8 = 18;
/// Default constant quality for NVENC
pub const NVENC_CQ: u8 = 19;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "160k";

/// Vertical output resolution
pub const OUTPUT_WIDTH: u32 = 1080;
pub const OUTPUT_HEIGHT: u32 = 1920;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (`libx264` or `h264_nvenc`)
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Quality (CRF for libx264, CQ for NVENC; lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

impl EncodingConfig {
    /// Hardware encode on NVIDIA GPUs.
    pub fn nvenc() -> Self {
        Self {
            codec: NVENC_VIDEO_CODEC.to_string(),
            preset: NVENC_PRESET.to_string(),
            crf: NVENC_CQ,
            ..Self::default()
        }
    }

    pub fn is_nvenc(&self) -> bool {
        self.codec.contains("nvenc")
    }

    /// Pick the encoder from `VIDEO_ENCODER` (`libx264` or `h264_nvenc`).
    pub fn from_env() -> Self {
        match std::env::var("VIDEO_ENCODER").as_deref() {
            Ok(NVENC_VIDEO_CODEC) | Ok("nvenc") => Self::nvenc(),
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_short_form_output() {
        let enc = EncodingConfig::default();
        assert_eq!(enc.codec, "libx264");
        assert_eq!(enc.preset, "veryfast");
        assert_eq!(enc.crf, 18);
        assert_eq!(enc.audio_bitrate, "160k");
        assert!(!enc.is_nvenc());
        assert!(EncodingConfig::nvenc().is_nvenc());
    }
}
