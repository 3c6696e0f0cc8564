//! Segment model and merge arithmetic.
//!
//! A [`Segment`] is an approved `[start, end]` keep window from an edit
//! decision list. A [`DetectedSegment`] is a raw detector hit; detectors
//! accumulate its duration incrementally while scanning, so the stored
//! duration is authoritative rather than always being `end - start`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timecode::{position_in_seconds, seconds_to_position, TimecodeError};

/// Error type for segment construction and parsing
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Segment with `start > end`
    #[error("Invalid segment range: start {start} is after end {end}")]
    InvalidRange { start: f64, end: f64 },

    /// A `start-end` pair that does not split into two timecodes
    #[error("Invalid segment pair: {0:?}")]
    InvalidPair(String),

    /// Malformed timecode inside a pair
    #[error(transparent)]
    Timecode(#[from] TimecodeError),
}

/// An immutable `[start, end]` keep window, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    start: f64,
    end: f64,
}

impl Segment {
    /// Create a segment, enforcing `start <= end`.
    pub fn new(start: f64, end: f64) -> Result<Self, SegmentError> {
        if start > end {
            return Err(SegmentError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A raw detector hit with its incrementally accumulated duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedSegment {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

impl DetectedSegment {
    pub fn new(start: f64, end: f64, duration: f64) -> Self {
        Self {
            start,
            end,
            duration,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Merge chronologically ordered detector hits into a minimal set of windows.
///
/// The running segment absorbs the next hit when the gap between them is at
/// most `min_gap`, extending its end and summing durations gap included;
/// otherwise it is closed and a new one starts. Output durations are rounded
/// to 2 decimal places.
pub fn merge_adjacent_segments(segments: &[DetectedSegment], min_gap: f64) -> Vec<DetectedSegment> {
    let mut merged: Vec<DetectedSegment> = Vec::new();

    let mut iter = segments.iter().copied();
    let mut current = match iter.next() {
        Some(first) => first,
        None => return merged,
    };

    for next in iter {
        let gap = next.start - current.end;
        if gap <= min_gap {
            current.end = next.end;
            current.duration += gap + next.duration;
        } else {
            current.duration = round2(current.duration);
            merged.push(current);
            current = next;
        }
    }

    current.duration = round2(current.duration);
    merged.push(current);
    merged
}

/// Merge variant for frame-accurate detectors: hits shorter than
/// `min_duration` are dropped first, so a spurious one-frame hit cannot
/// fracture an otherwise-contiguous long segment, then neighbours are merged
/// across the gaps this creates.
pub fn merge_filtered_segments(
    segments: &[DetectedSegment],
    min_gap: f64,
    min_duration: f64,
) -> Vec<DetectedSegment> {
    let kept: Vec<DetectedSegment> = segments
        .iter()
        .filter(|segment| segment.duration >= min_duration)
        .copied()
        .collect();

    merge_adjacent_segments(&kept, min_gap)
}

/// Render detector hits as `HH:MM:SS.mmm-HH:MM:SS.mmm,…` for human review
/// and sidecar storage. The rendering is exactly invertible by
/// [`parse_segments`].
pub fn humanize_segments(segments: &[DetectedSegment]) -> String {
    segments
        .iter()
        .map(|segment| {
            format!(
                "{}-{}",
                seconds_to_position(segment.start),
                seconds_to_position(segment.end)
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse an EDL segment string (`start-end,start-end,…`, trailing comma
/// tolerated) into validated segments. An empty string yields no segments.
pub fn parse_segments(raw: &str) -> Result<Vec<Segment>, SegmentError> {
    let trimmed = raw.trim().trim_end_matches(',');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split(',')
        .map(|pair| {
            let (start, end) = pair
                .split_once('-')
                .ok_or_else(|| SegmentError::InvalidPair(pair.to_string()))?;
            Segment::new(
                position_in_seconds(start.trim())?,
                position_in_seconds(end.trim())?,
            )
        })
        .collect()
}

/// Total keep duration of an ordered segment list.
pub fn total_duration(segments: &[Segment]) -> f64 {
    segments.iter().map(Segment::duration).sum()
}
