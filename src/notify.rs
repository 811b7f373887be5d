// Job lifecycle notifications
//
// Posts embed-style webhook messages when jobs start, complete, or fail.
// Strictly best-effort: a dead webhook never affects job status.

use log::{debug, warn};
use reqwest::Client;
use serde::Serialize;

use crate::database::models::Job;

const USERNAME: &str = "Clearscribe";

const COLOR_STARTED: u32 = 0x0099ff;
const COLOR_COMPLETED: u32 = 0x00ff00;
const COLOR_FAILED: u32 = 0xff0000;

/// Error messages longer than this are cut before embedding
const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Serialize)]
struct WebhookPayload {
    username: String,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    footer: EmbedFooter,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

/// Webhook notifier; does nothing when no URL is configured
pub struct Notifier {
    webhook_url: Option<String>,
    client: Client,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { webhook_url, client }
    }

    pub async fn job_started(&self, job: &Job) {
        let embed = Embed {
            title: "Transcription started".to_string(),
            description: "First pass is running.".to_string(),
            color: COLOR_STARTED,
            fields: vec![field("File", &job.original_filename, true)],
            footer: footer(&job.id),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        self.post(embed).await;
    }

    pub async fn job_completed(&self, job: &Job, processing_seconds: f64, applied_corrections: i64) {
        let embed = Embed {
            title: "Transcription completed".to_string(),
            description: "The transcript is ready.".to_string(),
            color: COLOR_COMPLETED,
            fields: vec![
                field("File", &job.original_filename, true),
                field("Processing time", &format!("{:.1}s", processing_seconds), true),
                field("Corrections applied", &applied_corrections.to_string(), true),
            ],
            footer: footer(&job.id),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        self.post(embed).await;
    }

    pub async fn job_failed(&self, job: &Job, error: &str) {
        let embed = Embed {
            title: "Transcription failed".to_string(),
            description: "The job could not be completed.".to_string(),
            color: COLOR_FAILED,
            fields: vec![
                field("File", &job.original_filename, true),
                field("Error", &truncate_error(error), false),
            ],
            footer: footer(&job.id),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        self.post(embed).await;
    }

    async fn post(&self, embed: Embed) {
        let Some(url) = &self.webhook_url else {
            debug!("No webhook configured, skipping notification");
            return;
        };

        let payload = WebhookPayload {
            username: USERNAME.to_string(),
            embeds: vec![embed],
        };

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().as_u16() == 429 => {
                warn!("Webhook rate limited (429), notification dropped");
            }
            Ok(response) if !response.status().is_success() => {
                warn!("Webhook returned {}", response.status());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to post webhook notification: {}", e);
            }
        }
    }
}

fn field(name: &str, value: &str, inline: bool) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline,
    }
}

fn footer(job_id: &str) -> EmbedFooter {
    EmbedFooter {
        text: format!("Job {}", job_id),
    }
}

fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_CHARS {
        return error.to_string();
    }

    let cut: String = error.chars().take(MAX_ERROR_CHARS).collect();
    format!("{}…", cut)
}
