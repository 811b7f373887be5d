// First-pass ASR client
//
// Uploads the source audio to the recognizer service and deserializes the
// word-level timings the rest of the pipeline runs on.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Error types for first-pass recognition
#[derive(Debug, Clone)]
pub enum AsrError {
    /// Could not read the uploaded audio from disk
    FileUnreadable(String),
    /// Service not reachable (connection refused, DNS, timeout)
    ServiceUnavailable(String),
    /// Service answered with a non-2xx status
    RequestFailed(String),
    /// Response body did not match the expected shape
    InvalidResponse(String),
}

impl fmt::Display for AsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsrError::FileUnreadable(msg) => write!(f, "Cannot read audio file: {}", msg),
            AsrError::ServiceUnavailable(msg) => write!(f, "ASR service unavailable: {}", msg),
            AsrError::RequestFailed(msg) => write!(f, "ASR request failed: {}", msg),
            AsrError::InvalidResponse(msg) => write!(f, "Invalid ASR response: {}", msg),
        }
    }
}

impl std::error::Error for AsrError {}

/// One recognized word with timing and confidence
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub probability: f64,
}

/// The verbose transcription response. Only the fields the pipeline consumes
/// are modeled; everything else in the payload is ignored.
#[derive(Debug, Deserialize)]
pub struct VerboseTranscription {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub words: Vec<WordTiming>,
}

/// Seam for the first-pass recognizer, mockable in worker tests
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<VerboseTranscription, AsrError>;
}

/// HTTP client for a whisper-compatible `/v1/audio/transcriptions` endpoint
pub struct WhisperApiClient {
    base_url: String,
    model: String,
    client: Client,
}

impl WhisperApiClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperApiClient {
    /// One shot, no retry. A failed first pass fails the whole job; retrying
    /// is an operator decision, not this client's.
    async fn transcribe(&self, audio_path: &Path) -> Result<VerboseTranscription, AsrError> {
        let audio_bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| AsrError::FileUnreadable(format!("{}: {}", audio_path.display(), e)))?;

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let part = reqwest::multipart::Part::bytes(audio_bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| AsrError::RequestFailed(format!("Failed to build multipart: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");

        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        log::debug!("Posting audio to {}", url);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AsrError::ServiceUnavailable(format!("Cannot reach ASR service: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AsrError::RequestFailed(format!(
                "ASR service returned {}: {}",
                status, body
            )));
        }

        let transcription: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| AsrError::InvalidResponse(e.to_string()))?;

        log::info!(
            "First pass recognized {} words ({} chars of text)",
            transcription.words.len(),
            transcription.text.len()
        );

        Ok(transcription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_response_parsing() {
        let raw = r#"{
            "text": "Hello world",
            "language": "en",
            "duration": 1.5,
            "segments": [{"id": 0, "text": "Hello world"}],
            "words": [
                {"word": "Hello", "start": 0.0, "end": 0.5, "probability": 0.98},
                {"word": "world", "start": 0.5, "end": 1.0, "probability": 0.42}
            ]
        }"#;

        let parsed: VerboseTranscription = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text, "Hello world");
        assert_eq!(parsed.language.as_deref(), Some("en"));
        assert_eq!(parsed.words.len(), 2);
        assert_eq!(parsed.words[1].word, "world");
        assert!(parsed.words[1].probability < 0.6);
    }

    #[test]
    fn test_words_default_to_empty() {
        // A response without word timestamps still deserializes
        let raw = r#"{"text": "Hello"}"#;
        let parsed: VerboseTranscription = serde_json::from_str(raw).unwrap();
        assert!(parsed.words.is_empty());
        assert!(parsed.duration.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_maps_to_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("sample.wav");
        std::fs::write(&audio, b"RIFFdata").unwrap();

        // Port 9 (discard) refuses connections on test hosts
        let client = WhisperApiClient::new("http://127.0.0.1:9", "whisper-1");
        let err = client.transcribe(&audio).await.unwrap_err();
        assert!(matches!(err, AsrError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_unreadable() {
        let client = WhisperApiClient::new("http://127.0.0.1:9", "whisper-1");
        let err = client.transcribe(Path::new("/nonexistent/audio.wav")).await.unwrap_err();
        assert!(matches!(err, AsrError::FileUnreadable(_)));
    }
}
