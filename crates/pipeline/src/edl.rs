//! Edit decision list files.
//!
//! An EDL is the approved keep-segments record for one recording, written
//! next to the source as `<recording>.yml`. The format is line-oriented
//! `key: value` text (YAML-compatible on purpose, so operators can edit it
//! by hand):
//!
//! ```text
//! filename: Movie Name.mp4
//! segments: 00:00:03.370-00:00:05.960,00:00:10.520-00:00:18.200,
//! skip_backup: no
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::segments::{parse_segments, Segment, SegmentError};

/// Valid output file name: word chars, apostrophe, accented letters,
/// `!()[],#-. ` and space, ending in `.mp4`.
fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w&àéèï'!()\[\], #\-.]+\.mp4$").expect("valid regex"))
}

/// One or more `HH:MM:SS.mmm-HH:MM:SS.mmm` pairs separated by commas, with
/// millisecond precision and an optional trailing comma.
fn segments_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:\d{2,}:\d{2}:\d{2}\.\d{2,3}-\d{2,}:\d{2}:\d{2}\.\d{2,3},)*\d{2,}:\d{2}:\d{2}\.\d{2,3}-\d{2,}:\d{2}:\d{2}\.\d{2,3},?$",
        )
        .expect("valid regex")
    })
}

/// Error type for EDL loading and validation
#[derive(Debug, Error)]
pub enum EdlError {
    /// IO error reading the EDL file
    #[error("Failed to read EDL {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required key is absent
    #[error("EDL {path} is missing the {key:?} key")]
    MissingKey { path: PathBuf, key: &'static str },

    /// The output filename does not match the allowed pattern
    #[error("EDL {path} has an invalid filename: {value:?}")]
    InvalidFilename { path: PathBuf, value: String },

    /// The segments value does not match the timecode-pair pattern
    #[error("EDL {path} has an invalid segments value: {value:?}")]
    InvalidSegments { path: PathBuf, value: String },

    /// The skip_backup value is not a recognized boolean
    #[error("EDL {path} has an invalid skip_backup value: {value:?}")]
    InvalidSkipBackup { path: PathBuf, value: String },

    /// A segment pair failed validation after matching the pattern
    #[error("EDL {path}: {source}")]
    Segment {
        path: PathBuf,
        source: SegmentError,
    },
}

/// Validated content of an edit decision list.
#[derive(Debug, Clone, PartialEq)]
pub struct EdlContent {
    /// Output file name, including the `.mp4` suffix
    pub filename: String,
    /// Ordered keep windows
    pub segments: Vec<Segment>,
    /// When set, the source is left in place and only the EDL is
    /// deactivated after processing
    pub skip_backup: bool,
}

/// An edit decision list bound to its on-disk location.
#[derive(Debug, Clone, PartialEq)]
pub struct EdlFile {
    pub path: PathBuf,
    pub content: EdlContent,
}

impl EdlFile {
    /// Read and validate the EDL at `path`.
    pub fn load(path: &Path) -> Result<Self, EdlError> {
        let text = fs::read_to_string(path).map_err(|source| EdlError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let content = parse_edl(path, &text)?;
        Ok(Self {
            path: path.to_path_buf(),
            content,
        })
    }

    /// Path of the recording this EDL describes: the EDL path minus its own
    /// extension (`rec.mp4.yml` -> `rec.mp4`).
    pub fn source_path(&self) -> PathBuf {
        self.path.with_extension("")
    }
}

fn parse_edl(path: &Path, text: &str) -> Result<EdlContent, EdlError> {
    let mut filename: Option<String> = None;
    let mut raw_segments: Option<String> = None;
    let mut skip_backup = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        let value = strip_inline_comment(value.trim());

        match key.trim() {
            "filename" => filename = Some(value.to_string()),
            "segments" => raw_segments = Some(value.to_string()),
            "skip_backup" => {
                skip_backup = match value.to_lowercase().as_str() {
                    "yes" | "true" => true,
                    "no" | "false" => false,
                    _ => {
                        return Err(EdlError::InvalidSkipBackup {
                            path: path.to_path_buf(),
                            value: value.to_string(),
                        })
                    }
                }
            }
            // Unknown keys are tolerated, as a YAML loader would
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| EdlError::MissingKey {
        path: path.to_path_buf(),
        key: "filename",
    })?;
    let raw_segments = raw_segments.ok_or_else(|| EdlError::MissingKey {
        path: path.to_path_buf(),
        key: "segments",
    })?;

    if !filename_pattern().is_match(&filename) {
        return Err(EdlError::InvalidFilename {
            path: path.to_path_buf(),
            value: filename,
        });
    }

    if !segments_pattern().is_match(&raw_segments) {
        return Err(EdlError::InvalidSegments {
            path: path.to_path_buf(),
            value: raw_segments,
        });
    }

    let segments = parse_segments(&raw_segments).map_err(|source| EdlError::Segment {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(EdlContent {
        filename,
        segments,
        skip_backup,
    })
}

fn strip_inline_comment(value: &str) -> &str {
    match value.split_once(" #") {
        Some((before, _)) => before.trim_end(),
        None => value,
    }
}
