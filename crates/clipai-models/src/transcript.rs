//! Transcript segments, clip-local segments and subtitle timing types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A span of transcribed speech on the source video's global timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A transcript segment re-expressed relative to a clip's own start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocalSegment {
    /// Local start in seconds (0 = clip start)
    pub start: f64,
    /// Local end in seconds
    pub end: f64,
    /// Whitespace-normalized text
    pub text: String,
}

impl LocalSegment {
    pub fn start_ms(&self) -> u64 {
        secs_to_ms(self.start)
    }

    pub fn end_ms(&self) -> u64 {
        secs_to_ms(self.end)
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms().saturating_sub(self.start_ms())
    }
}

/// Highlight timing for one word, in milliseconds on the clip timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl WordTiming {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// One displayed subtitle event.
///
/// `lines` holds one or two display lines, each an ordered run of word timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleCue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub lines: Vec<Vec<WordTiming>>,
}

impl SubtitleCue {
    /// All word timings in display order.
    pub fn words(&self) -> impl Iterator<Item = &WordTiming> {
        self.lines.iter().flatten()
    }

    pub fn word_count(&self) -> usize {
        self.lines.iter().map(Vec::len).sum()
    }
}

/// Convert seconds to whole milliseconds, clamping negatives to zero.
pub fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}
