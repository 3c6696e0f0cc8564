//! Detector auto-selection.
//!
//! Full detection is expensive (near real-time decode) and most recordings
//! only need one strategy, so candidates are probed cheaply in priority
//! order and the first viable one is committed to; the rest are discarded.

use std::path::Path;

use tracing::info;

use super::adapters::{
    AudioCorrelationDetector, CropRatioDetector, TemplateMatchDetector, WholeFileDetector,
};
use super::{DetectError, SegmentDetector};
use crate::media;
use crate::segments::DetectedSegment;
use crate::stop::StopFlag;
use movie_pipeline_config::SegmentDetectionConfig;

/// A detector committed from a priority-ordered candidate list.
pub struct AutoDetect {
    detector: Box<dyn SegmentDetector>,
}

impl AutoDetect {
    /// Probe `candidates` in order and commit to the first one whose
    /// pre-check reports plausible signal. A candidate whose pre-check
    /// errors is logged and skipped.
    pub fn commit(
        candidates: Vec<Box<dyn SegmentDetector>>,
        path: &Path,
    ) -> Result<Self, DetectError> {
        for candidate in candidates {
            match candidate.should_proceed() {
                Ok(true) => {
                    info!(detector = candidate.name(), path = %path.display(), "Committed detector");
                    return Ok(Self {
                        detector: candidate,
                    });
                }
                Ok(false) => {
                    info!(detector = candidate.name(), "No plausible signal, trying next");
                }
                Err(e) => {
                    info!(detector = candidate.name(), error = %e, "Unavailable, trying next");
                }
            }
        }

        Err(DetectError::NoSuitableDetectorFound(path.to_path_buf()))
    }

    /// Build and commit the standard candidate chain for a recording:
    /// logo template match, letterbox crop ratio, dual-audio correlation,
    /// then the whole-file fallback.
    pub fn for_path(path: &Path, cfg: &SegmentDetectionConfig) -> Result<Self, DetectError> {
        let duration = media::media_duration(path)?;

        let mut candidates: Vec<Box<dyn SegmentDetector>> = Vec::new();
        match TemplateMatchDetector::new(path, duration, cfg) {
            Ok(detector) => candidates.push(Box::new(detector)),
            Err(e) => info!(error = %e, "Template detector unavailable"),
        }
        candidates.push(Box::new(CropRatioDetector::new(path, duration, cfg)));
        let audio_streams = media::audio_stream_count(path).unwrap_or(0);
        candidates.push(Box::new(AudioCorrelationDetector::new(
            path,
            duration,
            audio_streams,
        )));
        candidates.push(Box::new(WholeFileDetector::new(duration)));

        Self::commit(candidates, path)
    }

    /// Name of the committed inner detector.
    pub fn committed_name(&self) -> &'static str {
        self.detector.name()
    }
}

impl SegmentDetector for AutoDetect {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn should_proceed(&self) -> Result<bool, DetectError> {
        // Commitment already established viability.
        Ok(true)
    }

    fn detect(
        &self,
        on_progress: &mut dyn FnMut(f64),
        stop: &StopFlag,
    ) -> Result<Vec<DetectedSegment>, DetectError> {
        self.detector.detect(on_progress, stop)
    }

    fn merge_raw(
        &self,
        raw: &[DetectedSegment],
        cfg: &SegmentDetectionConfig,
    ) -> Vec<DetectedSegment> {
        self.detector.merge_raw(raw, cfg)
    }
}
