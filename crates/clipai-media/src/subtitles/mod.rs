//! Burned-in karaoke subtitles.
//!
//! A clip's subtitles are built in three steps: the global transcript is
//! windowed onto the clip's local timeline ([`window`]), each local segment is
//! split into per-word highlight timings and display lines ([`timing`]), and
//! the resulting cues are written as an ASS script ([`ass`]) for FFmpeg's
//! `subtitles` filter.

pub mod ass;
pub mod timing;
pub mod window;

pub use ass::{write_ass, AssStyle};
pub use timing::{build_cues, sanitize_text, LINE_WORD_THRESHOLD};
pub use window::window_segments;
