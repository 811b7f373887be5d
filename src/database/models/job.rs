// Database models - Job
use serde::{Deserialize, Serialize};

/// Lifecycle status of a transcription job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One uploaded audio file's path through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub status: JobStatus,
    pub audio_path: String,
    pub original_filename: String,
    pub transcript: Option<String>,
    pub processing_started: Option<String>,
    pub processing_ended: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// New job in the state the upload handler enqueues it in
    pub fn new(user_id: String, audio_path: String, original_filename: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: format!("job_{}", uuid::Uuid::new_v4()),
            user_id,
            status: JobStatus::Pending,
            audio_path,
            original_filename,
            transcript: None,
            processing_started: None,
            processing_ended: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
