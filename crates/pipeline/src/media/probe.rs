//! ffprobe wrappers.

use std::path::Path;
use std::process::Command;

use super::MediaError;

fn run_ffprobe(path: &Path, extra_args: &[&str]) -> Result<serde_json::Value, MediaError> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-of", "json"])
        .args(extra_args)
        .arg(path)
        .output()
        .map_err(|source| MediaError::Spawn {
            tool: "ffprobe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed {
            path: path.to_path_buf(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| MediaError::ProbeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Container duration of a media file, in seconds.
pub fn media_duration(path: &Path) -> Result<f64, MediaError> {
    let json = run_ffprobe(path, &["-show_entries", "format=duration"])?;

    json["format"]["duration"]
        .as_str()
        .and_then(|duration| duration.parse().ok())
        .ok_or_else(|| MediaError::MissingDuration {
            path: path.to_path_buf(),
        })
}

/// Number of audio streams in a media file.
pub fn audio_stream_count(path: &Path) -> Result<usize, MediaError> {
    let json = run_ffprobe(
        path,
        &["-select_streams", "a", "-show_entries", "stream=index"],
    )?;

    Ok(json["streams"].as_array().map(|s| s.len()).unwrap_or(0))
}
