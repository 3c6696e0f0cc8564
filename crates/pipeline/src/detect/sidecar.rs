//! Detection drivers and the `.segments.json` sidecar.
//!
//! Detection results are stored next to the source file so the review GUI
//! can pick them up later; a recording that already carries a sidecar is
//! skipped by the batch scan.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::adapters::build_detector;
use super::{DetectError, DetectorKind};
use crate::scan::{scan_recordings, segments_sidecar_path};
use crate::segments::{humanize_segments, DetectedSegment};
use crate::stop::StopFlag;
use movie_pipeline_config::Settings;

/// One detector's merged result, as stored in the sidecar.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetectorOutcome {
    pub segments: Vec<DetectedSegment>,
    pub humanized_segments: String,
}

impl DetectorOutcome {
    pub fn from_segments(segments: Vec<DetectedSegment>) -> Self {
        let humanized_segments = humanize_segments(&segments);
        Self {
            segments,
            humanized_segments,
        }
    }
}

/// Write the sidecar next to the source file. An empty result map writes
/// nothing and returns `None`.
pub fn write_sidecar(
    media_path: &Path,
    outcomes: &BTreeMap<String, DetectorOutcome>,
) -> io::Result<Option<PathBuf>> {
    if outcomes.is_empty() {
        return Ok(None);
    }

    let sidecar = segments_sidecar_path(media_path);
    let json = serde_json::to_string_pretty(outcomes).expect("sidecar serialization is infallible");
    std::fs::write(&sidecar, json)?;
    Ok(Some(sidecar))
}

/// Run the selected detectors against one recording and return the merged
/// results keyed by detector name. Progress is reported as one fraction
/// across all selected detectors.
pub fn detect_file(
    media_path: &Path,
    kinds: &[DetectorKind],
    settings: &Settings,
    on_progress: &mut dyn FnMut(f64),
    stop: &StopFlag,
) -> Result<BTreeMap<String, DetectorOutcome>, DetectError> {
    let cfg = &settings.segment_detection;
    let mut outcomes = BTreeMap::new();

    for (index, kind) in kinds.iter().enumerate() {
        info!(detector = %kind, path = %media_path.display(), "Running detection");

        let detector = build_detector(*kind, media_path, cfg)?;
        let raw = detector.detect(
            &mut |p| on_progress((index as f64 + p) / kinds.len() as f64),
            stop,
        )?;

        let merged = detector.merge_raw(&raw, cfg);
        outcomes.insert(kind.as_str().to_string(), DetectorOutcome::from_segments(merged));
    }

    Ok(outcomes)
}

/// Run detection over every recording found under `roots`, writing one
/// sidecar per file. A failing file is logged and skipped; the batch never
/// aborts on a single bad item. Returns the paths that produced a sidecar.
pub fn detect_directory(
    roots: &[PathBuf],
    kinds: &[DetectorKind],
    settings: &Settings,
    on_progress: &mut dyn FnMut(f64),
    stop: &StopFlag,
) -> Result<Vec<PathBuf>, DetectError> {
    let candidates = scan_recordings(roots);
    let total = candidates.len();
    let mut written = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
        if stop.is_set() {
            break;
        }

        let result = detect_file(
            &candidate.path,
            kinds,
            settings,
            &mut |p| on_progress((index as f64 + p) / total as f64),
            stop,
        );

        match result {
            Ok(outcomes) => {
                if let Some(sidecar) = write_sidecar(&candidate.path, &outcomes)? {
                    info!(sidecar = %sidecar.display(), "Wrote detection sidecar");
                    written.push(candidate.path.clone());
                }
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                warn!(path = %candidate.path.display(), error = %e, "Skipping recording");
            }
        }
    }

    Ok(written)
}
