//! Clip scoring through `/chat/completions`.
//!
//! The oracle returns `{"clips": [...]}`. Entries are handed back untouched;
//! an unusable reply becomes an empty list so the caller falls back to a
//! deterministic partition.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use clipai_models::TranscriptSegment;

use crate::client::MlClient;
use crate::error::{MlError, MlResult};
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat};

/// Longest transcript excerpt sent to the oracle, in characters.
pub const MAX_TRANSCRIPT_CHARS: usize = 15_000;

const SYSTEM_PROMPT: &str = "You are an expert in short-form video virality. \
Using the transcript, the visual energy peaks (seconds) and the speech rhythm, \
pick the most engaging self-contained moments. Reply with a JSON object \
{\"clips\": [{\"start\": seconds, \"end\": seconds, \"title\": string, \
\"reason\": string, \"hook\": string, \"summary\": string, \"hashtags\": [string]}]} \
and nothing else. Every clip must last between min_duration and max_duration seconds.";

/// Inputs for one scoring call.
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub segments: &'a [TranscriptSegment],
    pub visual_peaks: &'a [f64],
    pub num_clips: u32,
    pub min_duration: f64,
    pub max_duration: f64,
}

/// `[start → end] text` per segment, newline-joined and cut to
/// [`MAX_TRANSCRIPT_CHARS`].
pub fn build_transcript_lines(segments: &[TranscriptSegment]) -> String {
    let full = segments
        .iter()
        .map(|s| format!("[{:.2} → {:.2}] {}", s.start, s.end, s.text))
        .collect::<Vec<_>>()
        .join("\n");
    match full.char_indices().nth(MAX_TRANSCRIPT_CHARS) {
        Some((cut, _)) => full[..cut].to_string(),
        None => full,
    }
}

fn user_payload(request: &ScoringRequest<'_>) -> Value {
    json!({
        "transcript": build_transcript_lines(request.segments),
        "visual_peaks": request.visual_peaks,
        "num_clips": request.num_clips,
        "min_duration": request.min_duration,
        "max_duration": request.max_duration,
    })
}

/// Remove a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Extract the raw candidate list from oracle content.
///
/// Accepts `{"clips": [...]}` or a bare array. Anything else yields an empty
/// list.
pub fn parse_clips(content: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(strip_code_fences(content)) {
        Ok(Value::Object(mut map)) => match map.remove("clips") {
            Some(Value::Array(clips)) => clips,
            _ => {
                warn!("Scoring reply has no clips array");
                Vec::new()
            }
        },
        Ok(Value::Array(clips)) => clips,
        Ok(_) => {
            warn!("Scoring reply is not an object");
            Vec::new()
        }
        Err(e) => {
            warn!("Scoring reply is not valid JSON: {}", e);
            Vec::new()
        }
    }
}

impl MlClient {
    /// Ask the oracle for candidate windows.
    pub async fn score_segments(&self, request: &ScoringRequest<'_>) -> MlResult<Vec<Value>> {
        let api_key = self.api_key()?;
        let url = self.endpoint("chat/completions");
        let body = ChatCompletionRequest {
            model: self.config.scoring_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_payload(request).to_string(),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!(
            segments = request.segments.len(),
            peaks = request.visual_peaks.len(),
            model = %self.config.scoring_model,
            "Sending scoring request"
        );

        let response = self
            .send(|| Ok(self.http.post(&url).bearer_auth(api_key).json(&body)))
            .await?;
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| MlError::invalid_response(format!("chat completion body: {}", e)))?;

        let clips = completion.first_content().map(parse_clips).unwrap_or_default();
        info!(candidates = clips.len(), "Scoring complete");
        Ok(clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MlClientConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_transcript_lines() {
        let segments = vec![
            TranscriptSegment::new(0.0, 2.5, "hello"),
            TranscriptSegment::new(2.5, 4.0, "world"),
        ];
        assert_eq!(
            build_transcript_lines(&segments),
            "[0.00 → 2.50] hello\n[2.50 → 4.00] world"
        );
    }

    #[test]
    fn test_transcript_truncated_on_char_boundary() {
        let segments: Vec<_> = (0..2000)
            .map(|i| TranscriptSegment::new(i as f64, i as f64 + 1.0, "é→ü texte"))
            .collect();
        let lines = build_transcript_lines(&segments);
        assert_eq!(lines.chars().count(), MAX_TRANSCRIPT_CHARS);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"clips\": []}\n```"), "{\"clips\": []}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_clips_shapes() {
        assert_eq!(parse_clips(r#"{"clips":[{"start":1,"end":30}]}"#).len(), 1);
        assert_eq!(parse_clips(r#"[{"start":1,"end":30},{}]"#).len(), 2);
        assert!(parse_clips(r#"{"clips":"none"}"#).is_empty());
        assert!(parse_clips("not json at all").is_empty());
        assert!(parse_clips("42").is_empty());
    }

    #[tokio::test]
    async fn test_score_segments_against_mock() {
        let server = MockServer::start().await;
        let content = "```json\n{\"clips\":[{\"start\":\"00:10\",\"end\":40,\"title\":\"t\",\"reason\":\"r\"}]}\n```";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = MlClientConfig::default()
            .with_api_key("k")
            .with_base_url(server.uri());
        let client = MlClient::new(config).unwrap();
        let segments = vec![TranscriptSegment::new(0.0, 60.0, "talk")];
        let request = ScoringRequest {
            segments: &segments,
            visual_peaks: &[12.5],
            num_clips: 1,
            min_duration: 20.0,
            max_duration: 45.0,
        };

        let clips = client.score_segments(&request).await.unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0]["start"], "00:10");
    }

    #[tokio::test]
    async fn test_score_segments_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let config = MlClientConfig::default()
            .with_api_key("k")
            .with_base_url(server.uri());
        let client = MlClient::new(config).unwrap();
        let request = ScoringRequest {
            segments: &[],
            visual_peaks: &[],
            num_clips: 3,
            min_duration: 6.0,
            max_duration: 25.0,
        };
        assert!(client.score_segments(&request).await.unwrap().is_empty());
    }
}
