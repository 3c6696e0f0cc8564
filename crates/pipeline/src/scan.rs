//! Discovery of recordings and pending edit decision lists.
//!
//! Batch detection walks library roots recursively for video files that do
//! not yet carry a detection sidecar; the folder runner enumerates pending
//! EDLs at the top level of one directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Video file extensions supported by the scanner (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mkv", ".mp4", ".avi", ".mov", ".m4v", ".ts", ".m2ts"];

/// A candidate recording discovered during library scanning.
#[derive(Debug, Clone)]
pub struct RecordingCandidate {
    /// Full path to the video file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Last modified time of the file.
    pub modified_time: SystemTime,
}

/// Constructs the detection sidecar path for a given video file.
///
/// The sidecar is placed adjacent to the video file with `.segments.json`
/// appended. For example: `/records/movie.mp4` -> `/records/movie.mp4.segments.json`
pub fn segments_sidecar_path(video_path: &Path) -> PathBuf {
    let mut sidecar_path = video_path.as_os_str().to_owned();
    sidecar_path.push(".segments.json");
    PathBuf::from(sidecar_path)
}

/// Checks if a detection sidecar exists for the given video file.
pub fn has_segments_sidecar(video_path: &Path) -> bool {
    segments_sidecar_path(video_path).exists()
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Scans the given library roots for recordings awaiting detection.
///
/// This function:
/// - Recursively walks each library root directory
/// - Skips hidden directories (names starting with `.`)
/// - Filters files by video extensions (case-insensitive)
/// - Excludes files with an existing `.segments.json` sidecar
pub fn scan_recordings(roots: &[PathBuf]) -> Vec<RecordingCandidate> {
    use walkdir::WalkDir;

    let mut candidates = Vec::new();

    for root in roots {
        if !root.exists() {
            continue;
        }

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    // Allow the root directory even if it starts with '.'
                    if name.starts_with('.') && entry.depth() > 0 {
                        return false;
                    }
                }
            }
            true
        });

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();

            if !entry.file_type().is_file() {
                continue;
            }

            if !is_video_file(path) {
                continue;
            }

            if has_segments_sidecar(path) {
                continue;
            }

            if let Ok(metadata) = entry.metadata() {
                candidates.push(RecordingCandidate {
                    path: path.to_path_buf(),
                    size_bytes: metadata.len(),
                    modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
        }
    }

    candidates
}

/// Enumerates pending EDL files at the top level of `dir`, matching the
/// configured extension (e.g. `.yml`, or a `.pending_yml_<i>` claim suffix
/// when re-claiming after a crash). Results are sorted by name for
/// deterministic partitioning.
pub fn pending_edls(dir: &Path, edl_ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut edls: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(edl_ext))
                .unwrap_or(false)
        })
        .collect();

    edls.sort();
    Ok(edls)
}
