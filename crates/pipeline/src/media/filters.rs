//! Detection filter runs.
//!
//! Each detector strategy maps to one ffmpeg filter invocation whose stderr
//! lines are folded into raw [`DetectedSegment`]s: `blackdetect`,
//! `silencedetect`, `cropdetect` (letterbox ratio changes), `axcorrelate`
//! over two audio tracks, and `freezedetect` over a cropped logo region.
//! A [`TimeWindow`] limits a run to a short span for cheap probing.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::transcode::run_with_progress;
use super::MediaError;
use crate::segments::DetectedSegment;
use crate::stop::StopFlag;

/// Aspect ratios a cropdetect hit must be close to before it counts as a
/// letterboxed program picture (cinema and broadcast formats).
const WHITELISTED_RATIOS: &[f64] = &[1.33, 1.37, 2.39, 2.20, 1.66, 2.0];

/// Gap above which two cropdetect hits start separate segments.
const CROP_MERGE_GAP: f64 = 0.1;

/// A limited span of the file, for cheap pre-checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub length: f64,
}

/// Pixel region of a channel logo inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One detection operation of the external toolkit.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectOp {
    /// Black frame periods over the whole picture
    Black,
    /// Silent periods on the default audio stream
    Silence,
    /// Periods where the picture is letterboxed to a whitelisted ratio
    Crop,
    /// Silence of the cross-correlation of two audio tracks
    AxCorrelate { tracks: (u32, u32) },
    /// Periods where a cropped logo region stays frozen (logo on screen)
    LogoFreeze { region: CropRegion },
}

fn key_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([\w.]+)\s*:\s*(-?[0-9]+(?:\.[0-9]+)?)").expect("valid regex")
    })
}

fn parse_keyed_floats(line: &str) -> HashMap<&str, f64> {
    key_value_pattern()
        .captures_iter(line)
        .filter_map(|captures| {
            let key = captures.get(1)?.as_str();
            let value: f64 = captures.get(2)?.as_str().parse().ok()?;
            Some((key, value))
        })
        .collect()
}

fn build_detect_command(path: &Path, op: &DetectOp, window: Option<TimeWindow>) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-nostdin"]);

    if let Some(window) = window {
        cmd.arg("-ss").arg(format!("{:.3}", window.start));
        cmd.arg("-t").arg(format!("{:.3}", window.length));
    }

    cmd.arg("-i").arg(path);

    match op {
        DetectOp::Black => {
            cmd.args(["-an", "-vf", "fps=5,blackdetect", "-f", "null", "-"]);
        }
        DetectOp::Silence => {
            cmd.args(["-vn", "-af", "silencedetect", "-f", "null", "-"]);
        }
        DetectOp::Crop => {
            cmd.args(["-an", "-vf", "fps=5,cropdetect", "-f", "null", "-"]);
        }
        DetectOp::AxCorrelate { tracks: (a, b) } => {
            cmd.arg("-filter_complex").arg(format!(
                "[0:a:{}][0:a:{}]axcorrelate,silencedetect=noise=0dB:d=420",
                a, b
            ));
            cmd.args(["-f", "null", "-"]);
        }
        DetectOp::LogoFreeze { region } => {
            cmd.arg("-an").arg("-vf").arg(format!(
                "crop={}:{}:{}:{},freezedetect=n=-60dB:d=2",
                region.width, region.height, region.x, region.y
            ));
            cmd.args(["-f", "null", "-"]);
        }
    }

    cmd
}

/// Incremental state folding filter lines into detected segments.
enum LineFolder {
    /// `black_start`/`black_end`/`black_duration` on one line
    Black,
    /// `*_start` on one line, `*_end` + `*_duration` on a later line
    StartEndPairs {
        start_key: &'static str,
        end_key: &'static str,
        duration_key: &'static str,
        pending_start: Option<f64>,
    },
    /// Timestamped `w`/`h` hits folded through the ratio whitelist
    CropRatio,
}

impl LineFolder {
    fn for_op(op: &DetectOp) -> Self {
        match op {
            DetectOp::Black => LineFolder::Black,
            DetectOp::Silence | DetectOp::AxCorrelate { .. } => LineFolder::StartEndPairs {
                start_key: "silence_start",
                end_key: "silence_end",
                duration_key: "silence_duration",
                pending_start: None,
            },
            DetectOp::LogoFreeze { .. } => LineFolder::StartEndPairs {
                start_key: "lavfi.freezedetect.freeze_start",
                end_key: "lavfi.freezedetect.freeze_end",
                duration_key: "lavfi.freezedetect.freeze_duration",
                pending_start: None,
            },
            DetectOp::Crop => LineFolder::CropRatio,
        }
    }

    fn consume(&mut self, line: &str, segments: &mut Vec<DetectedSegment>) {
        let values = parse_keyed_floats(line);
        if values.is_empty() {
            return;
        }

        match self {
            LineFolder::Black => {
                if let (Some(&start), Some(&end)) =
                    (values.get("black_start"), values.get("black_end"))
                {
                    let duration = values
                        .get("black_duration")
                        .copied()
                        .unwrap_or(end - start);
                    segments.push(DetectedSegment::new(start, end, duration));
                }
            }
            LineFolder::StartEndPairs {
                start_key,
                end_key,
                duration_key,
                pending_start,
            } => {
                if let Some(&start) = values.get(*start_key) {
                    *pending_start = Some(start);
                }
                if let Some(&end) = values.get(*end_key) {
                    if let Some(start) = pending_start.take() {
                        let duration =
                            values.get(*duration_key).copied().unwrap_or(end - start);
                        segments.push(DetectedSegment::new(start, end, duration));
                    }
                }
            }
            LineFolder::CropRatio => {
                let (width, height, position) = match (
                    values.get("w"),
                    values.get("h"),
                    values.get("t"),
                ) {
                    (Some(&w), Some(&h), Some(&t)) if h > 0.0 => (w, h, t),
                    _ => return,
                };

                let ratio = width / height;
                if !WHITELISTED_RATIOS
                    .iter()
                    .any(|whitelisted| (ratio - whitelisted).abs() / whitelisted <= 1e-2)
                {
                    return;
                }

                match segments.last_mut() {
                    Some(last) if position - last.end <= CROP_MERGE_GAP => {
                        last.end = position;
                        last.duration = ((position - last.start) * 100.0).round() / 100.0;
                    }
                    _ => segments.push(DetectedSegment::new(position, position, 0.0)),
                }
            }
        }
    }
}

/// Run one detection operation, returning raw chronologically ordered hits.
///
/// `total_duration` normalizes the progress stream (the window length when a
/// window is given). The stop flag kills the subprocess between lines.
pub fn run_detect_filter(
    path: &Path,
    op: &DetectOp,
    window: Option<TimeWindow>,
    total_duration: f64,
    on_progress: &mut dyn FnMut(f64),
    stop: &StopFlag,
) -> Result<Vec<DetectedSegment>, MediaError> {
    let mut cmd = build_detect_command(path, op, window);
    debug!(path = %path.display(), ?op, "Running detection filter");

    let span = window.map(|w| w.length).unwrap_or(total_duration);

    let mut segments = Vec::new();
    let mut folder = LineFolder::for_op(op);
    run_with_progress(&mut cmd, span, on_progress, stop, &mut |line| {
        folder.consume(line, &mut segments)
    })?;

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(op: &DetectOp, lines: &[&str]) -> Vec<DetectedSegment> {
        let mut folder = LineFolder::for_op(op);
        let mut segments = Vec::new();
        for line in lines {
            folder.consume(line, &mut segments);
        }
        segments
    }

    #[test]
    fn test_black_lines_fold_to_segments() {
        let segments = fold(
            &DetectOp::Black,
            &[
                "[blackdetect @ 0x55] black_start:0 black_end:2.12 black_duration:2.12",
                "frame= 1000 fps=250 time=00:01:02.00 speed=10x",
                "[blackdetect @ 0x55] black_start:615.2 black_end:618 black_duration:2.8",
            ],
        );

        assert_eq!(
            segments,
            vec![
                DetectedSegment::new(0.0, 2.12, 2.12),
                DetectedSegment::new(615.2, 618.0, 2.8),
            ]
        );
    }

    #[test]
    fn test_silence_lines_pair_start_and_end() {
        let segments = fold(
            &DetectOp::Silence,
            &[
                "[silencedetect @ 0x55] silence_start: 216.061",
                "[silencedetect @ 0x55] silence_end: 219.517 | silence_duration: 3.456",
            ],
        );

        assert_eq!(segments, vec![DetectedSegment::new(216.061, 219.517, 3.456)]);
    }

    #[test]
    fn test_silence_end_without_start_is_ignored() {
        let segments = fold(
            &DetectOp::Silence,
            &["[silencedetect @ 0x55] silence_end: 219.517 | silence_duration: 3.456"],
        );

        assert!(segments.is_empty());
    }

    #[test]
    fn test_freeze_lines_pair_start_and_end() {
        let segments = fold(
            &DetectOp::LogoFreeze {
                region: CropRegion {
                    x: 20,
                    y: 20,
                    width: 120,
                    height: 60,
                },
            },
            &[
                "[freezedetect @ 0x55] lavfi.freezedetect.freeze_start: 5.005",
                "[freezedetect @ 0x55] lavfi.freezedetect.freeze_duration: 120.5",
                "[freezedetect @ 0x55] lavfi.freezedetect.freeze_end: 125.505",
            ],
        );

        assert_eq!(segments, vec![DetectedSegment::new(5.005, 125.505, 120.5)]);
    }

    #[test]
    fn test_crop_hits_merge_within_gap() {
        // 1920x800 is 2.40:1, within 1% of the whitelisted 2.39.
        let segments = fold(
            &DetectOp::Crop,
            &[
                "[Parsed_cropdetect_1 @ 0x55] x1:0 x2:1919 y1:138 y2:937 w:1920 h:800 x:0 y:140 pts:119 t:4.76 crop=1920:800:0:140",
                "[Parsed_cropdetect_1 @ 0x55] x1:0 x2:1919 y1:138 y2:937 w:1920 h:800 x:0 y:140 pts:124 t:4.84 crop=1920:800:0:140",
                "[Parsed_cropdetect_1 @ 0x55] x1:0 x2:1919 y1:138 y2:937 w:1920 h:800 x:0 y:140 pts:500 t:20.0 crop=1920:800:0:140",
            ],
        );

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 4.76);
        assert_eq!(segments[0].end, 4.84);
        assert_eq!(segments[1].start, 20.0);
    }

    #[test]
    fn test_crop_hits_with_full_frame_ratio_are_ignored() {
        // 1920x1080 is 1.78:1, not a whitelisted cinema ratio.
        let segments = fold(
            &DetectOp::Crop,
            &["[Parsed_cropdetect_1 @ 0x55] x1:0 x2:1919 y1:0 y2:1079 w:1920 h:1080 x:0 y:0 pts:119 t:4.76 crop=1920:1080:0:0"],
        );

        assert!(segments.is_empty());
    }

    #[test]
    fn test_detect_command_applies_window() {
        let cmd = build_detect_command(
            Path::new("/records/rec.mp4"),
            &DetectOp::Black,
            Some(TimeWindow {
                start: 120.0,
                length: 10.0,
            }),
        );
        let args: Vec<String> = cmd
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect();

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "120.000");
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "10.000");
    }

    #[test]
    fn test_axcorrelate_command_targets_two_tracks() {
        let cmd = build_detect_command(
            Path::new("/records/rec.mp4"),
            &DetectOp::AxCorrelate { tracks: (0, 1) },
            None,
        );
        let args: Vec<String> = cmd
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect();

        let filter = args
            .iter()
            .position(|a| a == "-filter_complex")
            .map(|i| &args[i + 1])
            .unwrap();
        assert!(filter.contains("[0:a:0][0:a:1]axcorrelate"));
        assert!(filter.contains("silencedetect"));
    }
}
