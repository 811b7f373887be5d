// FFmpeg binary discovery and source probing

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use super::slicer::SliceError;

/// The duration line ffmpeg prints while opening an input,
/// e.g. "  Duration: 00:03:25.43, start: 0.000000, bitrate: 256 kb/s".
/// Unseekable inputs print "Duration: N/A", which simply does not match.
static DURATION_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

/// Locate the ffmpeg binary: explicit override first, then a few well-known
/// install locations, then whatever is on PATH.
pub fn find_ffmpeg_path() -> Option<PathBuf> {
    if let Ok(overridden) = std::env::var("FFMPEG_PATH") {
        let path = PathBuf::from(overridden);
        if path.exists() {
            return Some(path);
        }
    }

    let candidates = [
        "/usr/bin/ffmpeg",
        "/usr/local/bin/ffmpeg",
        "/opt/homebrew/bin/ffmpeg",
    ];

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            debug!("Using ffmpeg at {:?}", path);
            return Some(path);
        }
    }

    // Fall back to PATH resolution at spawn time
    Some(PathBuf::from("ffmpeg"))
}

/// Get audio duration in seconds. ffmpeg has no machine-readable probe of
/// its own, so this decodes to the null muxer and reads the duration banner
/// off stderr.
pub async fn probe_duration(ffmpeg_path: &Path, audio_path: &Path) -> Result<f64, SliceError> {
    let output = tokio::process::Command::new(ffmpeg_path)
        .arg("-i")
        .arg(audio_path)
        .arg("-f")
        .arg("null")
        .arg("-")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SliceError::SpawnFailed(format!("Failed to run ffmpeg: {}", e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);

    banner_duration(&stderr).ok_or_else(|| {
        SliceError::ProbeFailed(format!(
            "No duration banner for {}",
            audio_path.display()
        ))
    })
}

/// Pull the first duration banner out of ffmpeg's stderr and convert it
/// to seconds.
fn banner_duration(stderr: &str) -> Option<f64> {
    let caps = DURATION_BANNER.captures(stderr)?;

    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_duration_from_stderr() {
        let stderr = "Input #0, wav, from 'source.wav':\n  \
                      Duration: 00:00:05.50, start: 0.000000, bitrate: 256 kb/s\n";
        assert_eq!(banner_duration(stderr), Some(5.5));

        let long = "  Duration: 01:02:03.00, bitrate: 128 kb/s";
        assert_eq!(banner_duration(long), Some(3723.0));

        let whole_seconds = "Duration: 00:10:00, start: 0.0";
        assert_eq!(banner_duration(whole_seconds), Some(600.0));
    }

    #[test]
    fn test_banner_duration_rejects_unusable_output() {
        assert_eq!(banner_duration("Duration: N/A, bitrate: N/A"), None);
        assert_eq!(banner_duration("no banner here"), None);
        assert_eq!(banner_duration(""), None);
    }

    #[test]
    fn test_find_ffmpeg_prefers_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, b"").unwrap();

        std::env::set_var("FFMPEG_PATH", &fake);
        assert_eq!(find_ffmpeg_path(), Some(fake));
        std::env::remove_var("FFMPEG_PATH");
    }
}
