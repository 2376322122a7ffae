//! Speech-to-text through `/audio/transcriptions`.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use clipai_models::TranscriptSegment;

use crate::client::MlClient;
use crate::error::{MlError, MlResult};
use crate::types::VerboseTranscription;

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Convert a `verbose_json` response into global-timeline segments.
///
/// Segment text is trimmed. Segments with non-finite or non-increasing
/// bounds are dropped.
pub fn into_segments(response: VerboseTranscription) -> Vec<TranscriptSegment> {
    response
        .segments
        .into_iter()
        .filter(|s| s.start.is_finite() && s.end.is_finite() && s.end > s.start)
        .map(|s| TranscriptSegment::new(s.start.max(0.0), s.end, s.text.trim()))
        .collect()
}

impl MlClient {
    /// Transcribe an audio (or video) file into timestamped segments.
    pub async fn transcribe(&self, media: impl AsRef<Path>) -> MlResult<Vec<TranscriptSegment>> {
        let media = media.as_ref();
        let api_key = self.api_key()?;
        let bytes = tokio::fs::read(media).await?;
        let file_name = media
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        let mime = mime_for(media);
        let url = self.endpoint("audio/transcriptions");

        debug!(
            file = %media.display(),
            size = bytes.len(),
            model = %self.config.transcription_model,
            "Sending transcription request"
        );

        let response = self
            .send(|| {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)?;
                let form = Form::new()
                    .part("file", part)
                    .text("model", self.config.transcription_model.clone())
                    .text("response_format", "verbose_json")
                    .text("timestamp_granularities[]", "segment");
                Ok(self.http.post(&url).bearer_auth(api_key).multipart(form))
            })
            .await?;

        let body: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| MlError::invalid_response(format!("transcription body: {}", e)))?;
        let segments = into_segments(body);

        info!(segments = segments.len(), "Transcription complete");
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MlClientConfig;
    use crate::types::TranscriptionSegment;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_into_segments_trims_and_filters() {
        let response = VerboseTranscription {
            text: String::new(),
            segments: vec![
                TranscriptionSegment {
                    start: 0.0,
                    end: 2.5,
                    text: "  hello there ".into(),
                },
                TranscriptionSegment {
                    start: 3.0,
                    end: 3.0,
                    text: "degenerate".into(),
                },
                TranscriptionSegment {
                    start: 4.0,
                    end: f64::NAN,
                    text: "nan".into(),
                },
            ],
        };
        let segments = into_segments(response);
        assert_eq!(segments, vec![TranscriptSegment::new(0.0, 2.5, "hello there")]);
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(mime_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(mime_for(Path::new("a")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_transcribe_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hello world. second",
                "segments": [
                    {"id": 0, "start": 0.0, "end": 1.5, "text": " hello world."},
                    {"id": 1, "start": 1.5, "end": 3.0, "text": " second"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let audio = dir.path().join("audio.mp3");
        std::fs::write(&audio, b"fake mp3").unwrap();

        let config = MlClientConfig::default()
            .with_api_key("test-key")
            .with_base_url(format!("{}/v1", server.uri()));
        let client = MlClient::new(config).unwrap();

        let segments = client.transcribe(&audio).await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello world.");
        assert_eq!(segments[1].start, 1.5);
    }

    #[tokio::test]
    async fn test_transcribe_without_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let audio = dir.path().join("audio.mp3");
        std::fs::write(&audio, b"x").unwrap();

        let client = MlClient::new(MlClientConfig::default()).unwrap();
        let result = client.transcribe(&audio).await;
        assert!(matches!(result, Err(MlError::NotConfigured(_))));
    }
}
