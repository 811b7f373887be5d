// Audio clip slicer
//
// Extracts a time window from a source file into a 16 kHz mono PCM clip the
// multimodal model can consume. Seeking happens after the input is opened
// (`-ss` after `-i`), which forces decode-then-seek: stream-copy seeking
// snaps to keyframes and would misalign the correction window.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::debug;

use super::ffmpeg::{find_ffmpeg_path, probe_duration};

/// Error types for clip extraction
#[derive(Debug, Clone)]
pub enum SliceError {
    /// ffmpeg binary not found
    ToolMissing(String),
    /// Process could not be spawned
    SpawnFailed(String),
    /// ffmpeg exited non-zero
    ExtractionFailed(String),
    /// Source duration could not be read
    ProbeFailed(String),
}

impl fmt::Display for SliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceError::ToolMissing(msg) => write!(f, "ffmpeg not found: {}", msg),
            SliceError::SpawnFailed(msg) => write!(f, "Failed to spawn ffmpeg: {}", msg),
            SliceError::ExtractionFailed(msg) => write!(f, "Clip extraction failed: {}", msg),
            SliceError::ProbeFailed(msg) => write!(f, "Duration probe failed: {}", msg),
        }
    }
}

impl std::error::Error for SliceError {}

/// Seam for clip extraction, mockable in worker tests
#[async_trait]
pub trait ClipSlicer: Send + Sync {
    /// Write `[start_time, start_time + duration)` of `input` to `output`
    /// as 16 kHz mono pcm_s16le
    async fn slice(
        &self,
        input: &Path,
        output: &Path,
        start_time: f64,
        duration: f64,
    ) -> Result<(), SliceError>;

    /// Total duration of `input` in seconds
    async fn duration(&self, input: &Path) -> Result<f64, SliceError>;
}

/// Subprocess-backed slicer
pub struct FfmpegSlicer {
    ffmpeg_path: PathBuf,
}

impl FfmpegSlicer {
    pub fn new() -> Result<Self, SliceError> {
        let ffmpeg_path = find_ffmpeg_path()
            .ok_or_else(|| SliceError::ToolMissing("Please install FFmpeg".to_string()))?;
        Ok(Self { ffmpeg_path })
    }
}

#[async_trait]
impl ClipSlicer for FfmpegSlicer {
    async fn slice(
        &self,
        input: &Path,
        output: &Path,
        start_time: f64,
        duration: f64,
    ) -> Result<(), SliceError> {
        debug!(
            "Slicing {:?} [{:.2}s +{:.2}s] -> {:?}",
            input, start_time, duration, output
        );

        let result = tokio::process::Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            // -ss after -i: accurate decode-then-seek
            .arg("-ss")
            .arg(format!("{:.3}", start_time))
            .arg("-t")
            .arg(format!("{:.3}", duration))
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg("16000")
            .arg("-c:a")
            .arg("pcm_s16le")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SliceError::SpawnFailed(e.to_string()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SliceError::ExtractionFailed(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }

    async fn duration(&self, input: &Path) -> Result<f64, SliceError> {
        probe_duration(&self.ffmpeg_path, input).await
    }
}

/// Build a collision-free path for a temporary clip. The wall-clock suffix
/// keeps concurrent clips of the same window apart.
pub fn clip_output_path(base_dir: &Path, clip_start: f64, clip_end: f64) -> PathBuf {
    let wallclock_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    base_dir.join(format!(
        "clip_{}_{}_{}.wav",
        (clip_start * 1000.0) as u64,
        (clip_end * 1000.0) as u64,
        wallclock_ms
    ))
}
