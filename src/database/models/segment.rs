// Database models - Segment
use serde::{Deserialize, Serialize};

/// A single word from the first-pass recognizer, with timing and confidence.
/// Written once in bulk after first-pass ASR and never modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub job_id: String,
    pub word: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
}

impl Segment {
    pub fn new(job_id: &str, word: String, start_time: f64, end_time: f64, confidence: f64) -> Self {
        Self {
            id: format!("seg_{}", uuid::Uuid::new_v4()),
            job_id: job_id.to_string(),
            word,
            start_time,
            end_time,
            confidence,
        }
    }
}
