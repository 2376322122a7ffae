//! Per-word highlight timing and line wrapping.

use clipai_models::{LocalSegment, SubtitleCue, WordTiming};

/// Segments with more words than this are shown on two lines.
pub const LINE_WORD_THRESHOLD: usize = 7;

/// Make transcript text safe for ASS override syntax.
///
/// Braces open override blocks and backslashes start tags, so they are
/// swapped for look-alikes. Control characters are dropped and whitespace is
/// collapsed.
pub fn sanitize_text(text: &str) -> String {
    let replaced: String = text
        .chars()
        .filter_map(|c| match c {
            '{' => Some('('),
            '}' => Some(')'),
            '\\' => Some('/'),
            c if c.is_control() && !c.is_whitespace() => None,
            c => Some(c),
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Spread a segment's duration across its words.
///
/// Each word gets `max(floor(duration_ms / words), 1)` ms and the last word
/// also takes the division remainder, so durations sum to the segment length
/// whenever it is at least one millisecond per word. Shorter segments still
/// give every word 1 ms and overrun the segment end.
pub fn allocate_word_timings(segment: &LocalSegment) -> Vec<WordTiming> {
    let text = sanitize_text(&segment.text);
    let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return Vec::new();
    }

    let count = words.len() as u64;
    let duration = segment.duration_ms();
    let per_word = (duration / count).max(1);
    let remainder = duration.saturating_sub(per_word * count);
    let start = segment.start_ms();

    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let word_start = start + per_word * i as u64;
            let mut word_end = word_start + per_word;
            if i as u64 == count - 1 {
                word_end += remainder;
            }
            WordTiming {
                word: (*word).to_string(),
                start_ms: word_start,
                end_ms: word_end,
            }
        })
        .collect()
}

/// Split words into at most two display lines, the first taking the extra
/// word when the count is odd.
pub fn split_lines(words: Vec<WordTiming>) -> Vec<Vec<WordTiming>> {
    if words.len() <= LINE_WORD_THRESHOLD {
        return vec![words];
    }
    let first_len = words.len().div_ceil(2);
    let mut first = words;
    let second = first.split_off(first_len);
    vec![first, second]
}

/// Build the cue for one local segment, or `None` when it has no words.
pub fn build_cue(segment: &LocalSegment) -> Option<SubtitleCue> {
    let words = allocate_word_timings(segment);
    let last_end = words.last()?.end_ms;
    let start_ms = segment.start_ms();
    // Words may overrun very short segments; the cue always covers them.
    let end_ms = segment.end_ms().max(last_end);

    Some(SubtitleCue {
        start_ms,
        end_ms,
        lines: split_lines(words),
    })
}

/// Build cues for all local segments, skipping wordless ones.
pub fn build_cues(segments: &[LocalSegment]) -> Vec<SubtitleCue> {
    segments.iter().filter_map(build_cue).collect()
}
