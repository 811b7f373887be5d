// Second-pass multimodal corrector client
//
// Sends a short audio clip to a chat-completions endpoint and returns the
// model's literal transcription of it, with conversational preambles
// stripped. What to do with the text is reconciliation's problem.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Sentinel the model is instructed to emit for inaudible content
pub const UNINTELLIGIBLE_SENTINEL: &str = "[unintelligible]";

/// Kept low to suppress creative drift on short clips
const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 500;

const SYSTEM_INSTRUCTION: &str = "You are a literal audio transcriber. You write down exactly \
what is spoken in the audio you are given, word for word, in the original language. You never \
summarize, translate, or comment on the audio.";

const USER_PROMPT: &str = "Transcribe this audio exactly as spoken. Output only the raw \
transcription with no preamble and no quotation marks. Do not translate. If a part is \
inaudible, write [unintelligible] for that part.";

/// Leading phrases the model tends to prepend despite instructions.
/// Matched case-insensitively, with an optional trailing colon.
const PREAMBLE_PHRASES: &[&str] = &[
    "here is the transcription",
    "here's the transcription",
    "the transcription is",
    "the speaker says",
    "the speaker is saying",
    "the audio says",
    "transcription",
    "transcript",
];

/// Error types for second-pass correction
#[derive(Debug, Clone)]
pub enum CorrectorError {
    /// Could not read the clip from disk
    ClipUnreadable(String),
    /// Service not reachable
    ServiceUnavailable(String),
    /// Service answered with a non-2xx status
    RequestFailed(String),
    /// Response body did not match the expected shape
    InvalidResponse(String),
}

impl fmt::Display for CorrectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectorError::ClipUnreadable(msg) => write!(f, "Cannot read clip: {}", msg),
            CorrectorError::ServiceUnavailable(msg) => {
                write!(f, "Multimodal service unavailable: {}", msg)
            }
            CorrectorError::RequestFailed(msg) => write!(f, "Multimodal request failed: {}", msg),
            CorrectorError::InvalidResponse(msg) => {
                write!(f, "Invalid multimodal response: {}", msg)
            }
        }
    }
}

impl std::error::Error for CorrectorError {}

/// Chat request body
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentPart {
    Audio { audio: String },
    Text { text: String },
}

/// Chat response body; only the first choice's content is consumed
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Seam for the second-pass corrector, mockable in worker tests
#[async_trait]
pub trait ClipCorrector: Send + Sync {
    async fn transcribe_clip(&self, clip_path: &Path) -> Result<String, CorrectorError>;
}

/// HTTP client for a chat-completions endpoint that accepts audio content parts
pub struct MultimodalClient {
    base_url: String,
    model: String,
    client: Client,
}

impl MultimodalClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
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
impl ClipCorrector for MultimodalClient {
    async fn transcribe_clip(&self, clip_path: &Path) -> Result<String, CorrectorError> {
        let clip_bytes = tokio::fs::read(clip_path)
            .await
            .map_err(|e| CorrectorError::ClipUnreadable(format!("{}: {}", clip_path.display(), e)))?;

        let audio_b64 = base64::engine::general_purpose::STANDARD.encode(&clip_bytes);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(SYSTEM_INSTRUCTION.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: MessageContent::Parts(vec![
                        ContentPart::Audio { audio: audio_b64 },
                        ContentPart::Text { text: USER_PROMPT.to_string() },
                    ]),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                CorrectorError::ServiceUnavailable(format!("Cannot reach multimodal service: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CorrectorError::RequestFailed(format!(
                "Multimodal service returned {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CorrectorError::InvalidResponse(e.to_string()))?;

        let raw = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| CorrectorError::InvalidResponse("Response had no choices".to_string()))?;

        Ok(strip_preamble(raw))
    }
}

/// Remove conversational lead-ins the model prepends despite the prompt.
/// Only whitespace is trimmed beyond the phrase itself; capitalization and
/// punctuation of the remaining text are preserved for reconciliation to judge.
pub fn strip_preamble(raw: &str) -> String {
    let mut text = raw.trim();

    loop {
        let mut stripped = false;

        for phrase in PREAMBLE_PHRASES {
            let matches = text
                .get(..phrase.len())
                .map(|prefix| prefix.eq_ignore_ascii_case(phrase))
                .unwrap_or(false);

            if !matches {
                continue;
            }

            // Whole-word match only: the phrase must be followed by a
            // colon, whitespace, or nothing
            let after = &text[phrase.len()..];
            if !(after.is_empty()
                || after.starts_with(':')
                || after.starts_with(char::is_whitespace))
            {
                continue;
            }

            let mut rest = after.trim_start();
            if let Some(after_colon) = rest.strip_prefix(':') {
                rest = after_colon;
            }
            text = rest.trim_start();
            stripped = true;
            break;
        }

        if !stripped {
            break;
        }
    }

    text.to_string()
}
