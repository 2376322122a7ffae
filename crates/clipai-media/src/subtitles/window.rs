//! Mapping transcript segments onto a clip's local timeline.

use clipai_models::{LocalSegment, TranscriptSegment};

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Re-express the segments overlapping `[clip_start, clip_end)` in clip-local
/// seconds.
///
/// Overlap is strict: a segment that only touches the window at a boundary is
/// left out. Local bounds are clamped into `[0, clip_end - clip_start]`,
/// output is ordered by original start, and segments with no text after
/// whitespace normalization are dropped. An empty result is valid.
pub fn window_segments(
    segments: &[TranscriptSegment],
    clip_start: f64,
    clip_end: f64,
) -> Vec<LocalSegment> {
    if !(clip_start.is_finite() && clip_end.is_finite()) || clip_end <= clip_start {
        return Vec::new();
    }
    let clip_len = clip_end - clip_start;

    let mut overlapping: Vec<&TranscriptSegment> = segments
        .iter()
        .filter(|s| s.start.is_finite() && s.end.is_finite())
        .filter(|s| s.end > clip_start && s.start < clip_end)
        .collect();
    // Stable, so equal starts keep transcript order.
    overlapping.sort_by(|a, b| a.start.total_cmp(&b.start));

    overlapping
        .into_iter()
        .filter_map(|s| {
            let text = normalize_whitespace(&s.text);
            if text.is_empty() {
                return None;
            }
            let start = (s.start.max(clip_start) - clip_start).clamp(0.0, clip_len);
            let end = (s.end.min(clip_end) - clip_start).clamp(0.0, clip_len);
            (end > start).then_some(LocalSegment { start, end, text })
        })
        .collect()
}
