//! ASS (Advanced SubStation Alpha) karaoke script output.

use std::fmt::Write as _;
use std::path::Path;

use clipai_models::encoding::{OUTPUT_HEIGHT, OUTPUT_WIDTH};
use clipai_models::SubtitleCue;

use crate::error::MediaResult;

/// Subtitle look for the vertical output.
#[derive(Debug, Clone, PartialEq)]
pub struct AssStyle {
    pub font_name: String,
    pub font_size: u32,
    /// Sung (highlighted) colour, `&HAABBGGRR`
    pub primary_colour: String,
    /// Not-yet-sung colour
    pub secondary_colour: String,
    pub outline_colour: String,
    pub back_colour: String,
    pub bold: bool,
    pub outline: u32,
    pub shadow: u32,
    /// Numpad alignment (2 = bottom centre)
    pub alignment: u8,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
}

impl Default for AssStyle {
    fn default() -> Self {
        Self {
            font_name: "Poppins".to_string(),
            font_size: 64,
            primary_colour: "&H00FFFFFF".to_string(),
            secondary_colour: "&H0000FFFF".to_string(),
            outline_colour: "&H00111111".to_string(),
            back_colour: "&H96000000".to_string(),
            bold: true,
            outline: 6,
            shadow: 0,
            alignment: 2,
            margin_l: 60,
            margin_r: 60,
            margin_v: 110,
        }
    }
}

/// Format milliseconds as ASS `H:MM:SS.cc`.
pub fn format_ass_time(ms: u64) -> String {
    let cs = (ms + 5) / 10;
    let hours = cs / 360_000;
    let minutes = (cs / 6_000) % 60;
    let seconds = (cs / 100) % 60;
    let centis = cs % 100;
    format!("{hours}:{minutes:02}:{seconds:02}.{centis:02}")
}

fn to_cs(ms: u64) -> u64 {
    (ms + 5) / 10
}

/// Karaoke text for one cue: `{\kN}word` per word, lines joined by `\N`.
///
/// Durations are converted to centiseconds from cumulative offsets so rounding
/// error does not build up along the line; every tag is at least `\k1`.
pub fn karaoke_text(cue: &SubtitleCue) -> String {
    let mut out = String::new();
    let mut elapsed_cs = 0u64;

    for (line_idx, line) in cue.lines.iter().enumerate() {
        if line_idx > 0 {
            out.push_str("\\N");
        }
        for (word_idx, word) in line.iter().enumerate() {
            if word_idx > 0 {
                out.push(' ');
            }
            let end_cs = to_cs(word.end_ms.saturating_sub(cue.start_ms));
            let k = end_cs.saturating_sub(elapsed_cs).max(1);
            elapsed_cs += k;
            let _ = write!(out, "{{\\k{k}}}{}", word.word);
        }
    }
    out
}

/// Render a complete ASS script.
pub fn render_ass(cues: &[SubtitleCue], style: &AssStyle) -> String {
    let mut out = String::new();
    let bold = if style.bold { -1 } else { 0 };

    let _ = writeln!(out, "[Script Info]");
    let _ = writeln!(out, "ScriptType: v4.00+");
    let _ = writeln!(out, "PlayResX: {OUTPUT_WIDTH}");
    let _ = writeln!(out, "PlayResY: {OUTPUT_HEIGHT}");
    let _ = writeln!(out, "WrapStyle: 2");
    let _ = writeln!(out, "ScaledBorderAndShadow: yes");
    let _ = writeln!(out);
    let _ = writeln!(out, "[V4+ Styles]");
    let _ = writeln!(
        out,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    );
    let _ = writeln!(
        out,
        "Style: Main,{},{},{},{},{},{},{},0,0,0,100,100,0,0,1,{},{},{},{},{},{},1",
        style.font_name,
        style.font_size,
        style.primary_colour,
        style.secondary_colour,
        style.outline_colour,
        style.back_colour,
        bold,
        style.outline,
        style.shadow,
        style.alignment,
        style.margin_l,
        style.margin_r,
        style.margin_v,
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "[Events]");
    let _ = writeln!(
        out,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    );

    for cue in cues {
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},Main,,0,0,0,,{}",
            format_ass_time(cue.start_ms),
            format_ass_time(cue.end_ms),
            karaoke_text(cue)
        );
    }
    out
}

/// Write cues as an ASS file at `path`.
pub async fn write_ass(path: impl AsRef<Path>, cues: &[SubtitleCue], style: &AssStyle) -> MediaResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render_ass(cues, style)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::timing::build_cue;
    use clipai_models::{LocalSegment, WordTiming};

    fn word(word: &str, start_ms: u64, end_ms: u64) -> WordTiming {
        WordTiming {
            word: word.to_string(),
            start_ms,
            end_ms,
        }
    }

    #[test]
    fn test_format_ass_time() {
        assert_eq!(format_ass_time(0), "0:00:00.00");
        assert_eq!(format_ass_time(1500), "0:00:01.50");
        assert_eq!(format_ass_time(61_234), "0:01:01.23");
        assert_eq!(format_ass_time(3_600_000), "1:00:00.00");
    }

    #[test]
    fn test_karaoke_tags() {
        let cue = SubtitleCue {
            start_ms: 1000,
            end_ms: 4000,
            lines: vec![vec![word("hello", 1000, 2500), word("world", 2500, 4000)]],
        };
        assert_eq!(karaoke_text(&cue), "{\\k150}hello {\\k150}world");
    }

    #[test]
    fn test_karaoke_rounding_does_not_drift() {
        let seg = LocalSegment {
            start: 0.0,
            end: 1.0,
            text: "one two three".to_string(),
        };
        let cue = build_cue(&seg).unwrap();
        // 333/333/334 ms -> cumulative 33, 67, 100 cs
        assert_eq!(karaoke_text(&cue), "{\\k33}one {\\k34}two {\\k33}three");
    }

    #[test]
    fn test_karaoke_minimum_tag() {
        let cue = SubtitleCue {
            start_ms: 0,
            end_ms: 3,
            lines: vec![vec![word("a", 0, 1), word("b", 1, 2), word("c", 2, 3)]],
        };
        assert_eq!(karaoke_text(&cue), "{\\k1}a {\\k1}b {\\k1}c");
    }

    #[test]
    fn test_two_line_cue_uses_hard_break() {
        let seg = LocalSegment {
            start: 0.0,
            end: 9.0,
            text: "a b c d e f g h i".to_string(),
        };
        let text = karaoke_text(&build_cue(&seg).unwrap());
        assert_eq!(text.matches("\\N").count(), 1);
        assert_eq!(text.matches("\\k").count(), 9);
    }

    #[test]
    fn test_render_ass_document() {
        let cue = SubtitleCue {
            start_ms: 0,
            end_ms: 1500,
            lines: vec![vec![word("hi", 0, 1500)]],
        };
        let doc = render_ass(&[cue], &AssStyle::default());
        assert!(doc.contains("PlayResX: 1080"));
        assert!(doc.contains("PlayResY: 1920"));
        assert!(doc.contains("Style: Main,Poppins,64,"));
        assert!(doc.contains("Dialogue: 0,0:00:00.00,0:00:01.50,Main,,0,0,0,,{\\k150}hi"));
    }

    #[tokio::test]
    async fn test_write_ass_empty_cues() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("subs").join("short_01.ass");
        write_ass(&path, &[], &AssStyle::default()).await.unwrap();
        let doc = std::fs::read_to_string(&path).unwrap();
        assert!(doc.contains("[Events]"));
        assert!(!doc.contains("Dialogue:"));
    }
}
