// Worker configuration
// Read once at startup from environment variables into an immutable value

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

/// Immutable worker configuration, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Words with first-pass probability below this are correction candidates
    pub confidence_threshold: f64,
    /// Max gap in seconds between low-confidence words in the same cluster
    pub proximity_seconds: f64,
    /// Width in seconds of the audio window sent for re-transcription
    pub correction_window_seconds: f64,
    /// Sleep between queue polls
    pub poll_interval: Duration,
    /// Base URL of the first-pass ASR service
    pub asr_url: String,
    /// Model name passed to the ASR service
    pub asr_model: String,
    /// Base URL of the second-pass multimodal service
    pub multimodal_url: String,
    /// Model name passed to the multimodal service
    pub multimodal_model: String,
    /// SQLite database location
    pub database_path: PathBuf,
    /// Directory holding uploaded audio and temporary clips
    pub upload_dir: PathBuf,
    /// Optional webhook for job lifecycle notifications
    pub webhook_url: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.60,
            proximity_seconds: 5.0,
            correction_window_seconds: 20.0,
            poll_interval: Duration::from_millis(3000),
            asr_url: "http://localhost:9000".to_string(),
            asr_model: "whisper-1".to_string(),
            multimodal_url: "http://localhost:11434".to_string(),
            multimodal_model: "qwen2-audio".to_string(),
            database_path: PathBuf::from("clearscribe.db"),
            upload_dir: PathBuf::from("uploads"),
            webhook_url: None,
        }
    }
}

impl WorkerConfig {
    /// Build the configuration from environment variables, falling back to
    /// defaults for anything unset. Unparseable numeric values are logged and
    /// replaced by the default rather than aborting startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            confidence_threshold: parse_var("CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            proximity_seconds: parse_var("CLUSTERING_PROXIMITY_SECONDS", defaults.proximity_seconds),
            correction_window_seconds: parse_var(
                "CORRECTION_WINDOW_SECONDS",
                defaults.correction_window_seconds,
            ),
            poll_interval: Duration::from_millis(parse_var(
                "WORKER_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            asr_url: env::var("ASR_URL").unwrap_or(defaults.asr_url),
            asr_model: env::var("ASR_MODEL").unwrap_or(defaults.asr_model),
            multimodal_url: env::var("MULTIMODAL_URL").unwrap_or(defaults.multimodal_url),
            multimodal_model: env::var("MULTIMODAL_MODEL").unwrap_or(defaults.multimodal_model),
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
        }
    }
}

/// Parse an environment variable, keeping the default when unset or invalid.
fn parse_var<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value '{}' for {}, using default {}", raw, name, default);
                default
            }
        },
        Err(_) => default,
    }
}
