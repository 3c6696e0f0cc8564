//! Detector adapters over the external toolkit.
//!
//! Each adapter binds one toolkit detection operation to the common
//! [`SegmentDetector`] capability set. Construction is where per-recording
//! inputs (duration, channel template, audio layout) are resolved; a
//! constructor failure just makes the candidate unavailable to
//! [`AutoDetect`](super::auto::AutoDetect).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::{DetectError, DetectorKind, SegmentDetector};
use crate::media::{self, CropRegion, DetectOp, TimeWindow};
use crate::segments::{merge_filtered_segments, DetectedSegment};
use crate::stop::StopFlag;
use movie_pipeline_config::SegmentDetectionConfig;

/// Fixed padding trimmed from both ends by the whole-file fallback.
const WHOLE_FILE_PADDING_SECS: f64 = 5.0;

/// Window hit fraction above which the crop-ratio detector commits.
const CROP_PROBE_FRACTION: f64 = 0.5;

/// Evenly spread `count` probe windows of `length` seconds across the file.
fn probe_windows(duration: f64, count: u32, length: f64) -> Vec<TimeWindow> {
    (0..count)
        .map(|index| {
            let center = duration * (index + 1) as f64 / (count + 1) as f64;
            TimeWindow {
                start: (center - length / 2.0).max(0.0),
                length: length.min(duration),
            }
        })
        .collect()
}

/// Fraction of probe windows in which `op` produces at least one hit.
fn probed_hit_fraction(
    path: &Path,
    op: &DetectOp,
    duration: f64,
    cfg: &SegmentDetectionConfig,
) -> Result<f64, DetectError> {
    let windows = probe_windows(duration, cfg.probe_window_count, cfg.probe_window_secs);
    if windows.is_empty() {
        return Ok(0.0);
    }

    let stop = StopFlag::new();
    let mut hits = 0usize;
    for window in &windows {
        let raw = media::run_detect_filter(path, op, Some(*window), duration, &mut |_| {}, &stop)?;
        if !raw.is_empty() {
            hits += 1;
        }
    }

    let fraction = hits as f64 / windows.len() as f64;
    debug!(path = %path.display(), ?op, fraction, "Probe result");
    Ok(fraction)
}

/// Recording metadata written by the PVR next to the source file.
#[derive(Debug, Deserialize)]
struct RecordingMetadata {
    channel: String,
}

fn load_recording_metadata(media_path: &Path) -> Result<RecordingMetadata, DetectError> {
    let mut metadata_path = media_path.as_os_str().to_owned();
    metadata_path.push(".metadata.json");
    let metadata_path = PathBuf::from(metadata_path);

    let text = std::fs::read_to_string(&metadata_path).map_err(|e| {
        DetectError::TemplateUnavailable {
            path: media_path.to_path_buf(),
            detail: format!("no recording metadata ({})", e),
        }
    })?;

    serde_json::from_str(&text).map_err(|e| DetectError::TemplateUnavailable {
        path: media_path.to_path_buf(),
        detail: format!("unreadable recording metadata ({})", e),
    })
}

fn load_template_region(
    media_path: &Path,
    channel: &str,
    cfg: &SegmentDetectionConfig,
) -> Result<CropRegion, DetectError> {
    let templates_path =
        cfg.templates_path
            .as_ref()
            .ok_or_else(|| DetectError::TemplateUnavailable {
                path: media_path.to_path_buf(),
                detail: "no templates_path configured".to_string(),
            })?;

    let template_path = templates_path.join(format!("{}.json", channel));
    let text =
        std::fs::read_to_string(&template_path).map_err(|e| DetectError::TemplateUnavailable {
            path: media_path.to_path_buf(),
            detail: format!("{} ({})", template_path.display(), e),
        })?;

    serde_json::from_str(&text).map_err(|e| DetectError::TemplateUnavailable {
        path: media_path.to_path_buf(),
        detail: format!("unreadable template {} ({})", template_path.display(), e),
    })
}

/// Channel logo detector: the logo region stays frozen while the program is
/// on air and animates or disappears during breaks. Frame-accurate, so raw
/// hits go through the min-duration filtering merge.
pub struct TemplateMatchDetector {
    path: PathBuf,
    duration: f64,
    region: CropRegion,
    cfg: SegmentDetectionConfig,
}

impl TemplateMatchDetector {
    pub fn new(
        path: &Path,
        duration: f64,
        cfg: &SegmentDetectionConfig,
    ) -> Result<Self, DetectError> {
        let metadata = load_recording_metadata(path)?;
        let region = load_template_region(path, &metadata.channel, cfg)?;

        Ok(Self {
            path: path.to_path_buf(),
            duration,
            region,
            cfg: cfg.clone(),
        })
    }
}

impl SegmentDetector for TemplateMatchDetector {
    fn name(&self) -> &'static str {
        "match_template"
    }

    fn should_proceed(&self) -> Result<bool, DetectError> {
        let op = DetectOp::LogoFreeze {
            region: self.region,
        };
        let fraction = probed_hit_fraction(&self.path, &op, self.duration, &self.cfg)?;
        Ok(fraction >= self.cfg.match_threshold)
    }

    fn detect(
        &self,
        on_progress: &mut dyn FnMut(f64),
        stop: &StopFlag,
    ) -> Result<Vec<DetectedSegment>, DetectError> {
        let op = DetectOp::LogoFreeze {
            region: self.region,
        };
        Ok(media::run_detect_filter(
            &self.path,
            &op,
            None,
            self.duration,
            on_progress,
            stop,
        )?)
    }

    fn merge_raw(
        &self,
        raw: &[DetectedSegment],
        cfg: &SegmentDetectionConfig,
    ) -> Vec<DetectedSegment> {
        merge_filtered_segments(raw, cfg.min_gap, cfg.min_duration)
    }
}

/// Letterbox detector: the program picture is in a cinema aspect ratio
/// while breaks are full-frame.
pub struct CropRatioDetector {
    path: PathBuf,
    duration: f64,
    cfg: SegmentDetectionConfig,
}

impl CropRatioDetector {
    pub fn new(path: &Path, duration: f64, cfg: &SegmentDetectionConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            duration,
            cfg: cfg.clone(),
        }
    }
}

impl SegmentDetector for CropRatioDetector {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn should_proceed(&self) -> Result<bool, DetectError> {
        let fraction =
            probed_hit_fraction(&self.path, &DetectOp::Crop, self.duration, &self.cfg)?;
        Ok(fraction >= CROP_PROBE_FRACTION)
    }

    fn detect(
        &self,
        on_progress: &mut dyn FnMut(f64),
        stop: &StopFlag,
    ) -> Result<Vec<DetectedSegment>, DetectError> {
        Ok(media::run_detect_filter(
            &self.path,
            &DetectOp::Crop,
            None,
            self.duration,
            on_progress,
            stop,
        )?)
    }
}

/// Dual-audio detector: correlating the two language tracks goes silent
/// while both carry the same break feed.
pub struct AudioCorrelationDetector {
    path: PathBuf,
    duration: f64,
    audio_streams: usize,
}

impl AudioCorrelationDetector {
    pub fn new(path: &Path, duration: f64, audio_streams: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            duration,
            audio_streams,
        }
    }
}

impl SegmentDetector for AudioCorrelationDetector {
    fn name(&self) -> &'static str {
        "axcorrelate_silence"
    }

    fn should_proceed(&self) -> Result<bool, DetectError> {
        Ok(self.audio_streams >= 2)
    }

    fn detect(
        &self,
        on_progress: &mut dyn FnMut(f64),
        stop: &StopFlag,
    ) -> Result<Vec<DetectedSegment>, DetectError> {
        Ok(media::run_detect_filter(
            &self.path,
            &DetectOp::AxCorrelate { tracks: (0, 1) },
            None,
            self.duration,
            on_progress,
            stop,
        )?)
    }
}

/// Degenerate fallback: keep the whole file minus a fixed padding at both
/// ends. Always viable, so it terminates the AutoDetect chain.
pub struct WholeFileDetector {
    duration: f64,
}

impl WholeFileDetector {
    pub fn new(duration: f64) -> Self {
        Self { duration }
    }
}

impl SegmentDetector for WholeFileDetector {
    fn name(&self) -> &'static str {
        "whole_file"
    }

    fn should_proceed(&self) -> Result<bool, DetectError> {
        Ok(true)
    }

    fn detect(
        &self,
        on_progress: &mut dyn FnMut(f64),
        _stop: &StopFlag,
    ) -> Result<Vec<DetectedSegment>, DetectError> {
        let start = WHOLE_FILE_PADDING_SECS.min(self.duration);
        let end = (self.duration - WHOLE_FILE_PADDING_SECS).max(start);

        on_progress(1.0);
        Ok(vec![DetectedSegment::new(start, end, end - start)])
    }
}

/// Build one concrete detector for a recording, probing the toolkit for the
/// per-recording inputs it needs.
pub fn build_detector(
    kind: DetectorKind,
    path: &Path,
    cfg: &SegmentDetectionConfig,
) -> Result<Box<dyn SegmentDetector>, DetectError> {
    if kind == DetectorKind::Auto {
        return Ok(Box::new(super::auto::AutoDetect::for_path(path, cfg)?));
    }

    let duration = media::media_duration(path)?;

    Ok(match kind {
        DetectorKind::MatchTemplate => Box::new(TemplateMatchDetector::new(path, duration, cfg)?),
        DetectorKind::Crop => Box::new(CropRatioDetector::new(path, duration, cfg)),
        DetectorKind::AxcorrelateSilence => {
            let audio_streams = media::audio_stream_count(path)?;
            Box::new(AudioCorrelationDetector::new(path, duration, audio_streams))
        }
        DetectorKind::WholeFile => Box::new(WholeFileDetector::new(duration)),
        DetectorKind::Auto => unreachable!("handled above"),
    })
}
