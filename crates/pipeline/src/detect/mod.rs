//! Segment detection.
//!
//! A [`SegmentDetector`] is one pluggable strategy proposing candidate keep
//! windows from raw media analysis. Every adapter exposes the same two
//! capabilities: a cheap [`should_proceed`](SegmentDetector::should_proceed)
//! pre-check and a committed full [`detect`](SegmentDetector::detect) run.
//! [`AutoDetect`](auto::AutoDetect) walks a priority-ordered adapter list
//! and commits to the first viable one.

pub mod adapters;
pub mod auto;
pub mod sidecar;

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::media::MediaError;
use crate::segments::DetectedSegment;
use crate::stop::StopFlag;
use movie_pipeline_config::SegmentDetectionConfig;

pub use adapters::{
    build_detector, AudioCorrelationDetector, CropRatioDetector, TemplateMatchDetector,
    WholeFileDetector,
};
pub use auto::AutoDetect;
pub use sidecar::{detect_directory, detect_file, write_sidecar, DetectorOutcome};

/// Error type for segment detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// No candidate adapter reported plausible signal
    #[error("No suitable segment detector found for {0:?}")]
    NoSuitableDetectorFound(PathBuf),

    /// The template-match adapter has no usable template for this recording
    #[error("No detection template available for {path}: {detail}")]
    TemplateUnavailable { path: PathBuf, detail: String },

    /// The toolkit failed underneath the adapter
    #[error(transparent)]
    Media(#[from] MediaError),

    /// IO error reading adapter inputs (metadata, templates)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DetectError {
    /// Whether this error is a mid-run cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DetectError::Media(MediaError::Cancelled))
    }
}

/// One pluggable detection strategy.
pub trait SegmentDetector {
    /// Short stable name, used as the sidecar key.
    fn name(&self) -> &'static str;

    /// Cheap viability pre-check; typically samples a handful of short
    /// windows spread across the file rather than scanning the whole of it.
    fn should_proceed(&self) -> Result<bool, DetectError>;

    /// Committed full detection run with fractional progress.
    fn detect(
        &self,
        on_progress: &mut dyn FnMut(f64),
        stop: &StopFlag,
    ) -> Result<Vec<DetectedSegment>, DetectError>;

    /// Fold raw hits into reviewable keep windows. Frame-accurate adapters
    /// override this with the min-duration filtering variant.
    fn merge_raw(
        &self,
        raw: &[DetectedSegment],
        cfg: &SegmentDetectionConfig,
    ) -> Vec<DetectedSegment> {
        crate::segments::merge_adjacent_segments(raw, cfg.min_gap)
    }
}

/// Detector selection on the command line and in sidecar keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Auto,
    MatchTemplate,
    Crop,
    AxcorrelateSilence,
    WholeFile,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Auto => "auto",
            DetectorKind::MatchTemplate => "match_template",
            DetectorKind::Crop => "crop",
            DetectorKind::AxcorrelateSilence => "axcorrelate_silence",
            DetectorKind::WholeFile => "whole_file",
        }
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(DetectorKind::Auto),
            "match_template" => Ok(DetectorKind::MatchTemplate),
            "crop" => Ok(DetectorKind::Crop),
            "axcorrelate_silence" => Ok(DetectorKind::AxcorrelateSilence),
            "whole_file" => Ok(DetectorKind::WholeFile),
            other => Err(format!("Unknown detector: {:?}", other)),
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_kind_round_trip() {
        for kind in [
            DetectorKind::Auto,
            DetectorKind::MatchTemplate,
            DetectorKind::Crop,
            DetectorKind::AxcorrelateSilence,
            DetectorKind::WholeFile,
        ] {
            assert_eq!(kind.as_str().parse::<DetectorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_detector_kind_rejected() {
        assert!("telepathy".parse::<DetectorKind>().is_err());
    }
}
