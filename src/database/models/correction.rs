// Database models - Correction
use serde::{Deserialize, Serialize};

/// Audit record for one second-pass attempt, applied or not.
/// Anchored to any one segment inside the clip window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub id: String,
    pub segment_id: String,
    pub original_text: String,
    pub corrected_text: String,
    pub trigger_confidence: f64,
    /// Cleared once the temporary clip is removed
    pub clip_path: Option<String>,
    pub clip_start: f64,
    pub clip_end: f64,
    pub edit_distance: i64,
    pub should_apply: bool,
    pub reject_reason: Option<String>,
    pub created_at: String,
}

impl Correction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        segment_id: String,
        original_text: String,
        corrected_text: String,
        trigger_confidence: f64,
        clip_path: Option<String>,
        clip_start: f64,
        clip_end: f64,
        edit_distance: i64,
        should_apply: bool,
        reject_reason: Option<String>,
    ) -> Self {
        Self {
            id: format!("corr_{}", uuid::Uuid::new_v4()),
            segment_id,
            original_text,
            corrected_text,
            trigger_confidence,
            clip_path,
            clip_start,
            clip_end,
            edit_distance,
            should_apply,
            reject_reason,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
