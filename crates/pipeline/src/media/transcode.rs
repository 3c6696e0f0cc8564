//! Transcode command construction and progress-streaming execution.
//!
//! The approved keep windows become one `trim`/`atrim` + `concat` filter
//! graph; the encoder preset follows the configured hardware acceleration
//! mode. Progress is read off ffmpeg's stderr `time=` counters while the
//! last lines are retained for diagnostics on failure.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::MediaError;
use crate::segments::Segment;
use crate::stop::StopFlag;
use crate::timecode::position_in_seconds;
use movie_pipeline_config::HwAccel;

/// Number of trailing stderr lines kept for failure diagnostics.
const DIAGNOSTIC_TAIL_LINES: usize = 50;

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"time=(\d+:\d{2}:\d{2}\.\d+)").expect("valid regex"))
}

/// One transcode job for the external toolkit.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    /// Source recording
    pub input: PathBuf,
    /// Destination file
    pub output: PathBuf,
    /// Ordered keep windows to concatenate
    pub segments: Vec<Segment>,
}

fn build_filter_graph(segments: &[Segment]) -> String {
    let mut graph = String::new();
    let mut concat_inputs = String::new();

    for (index, segment) in segments.iter().enumerate() {
        graph.push_str(&format!(
            "[0:v]trim=start={start:.3}:end={end:.3},setpts=PTS-STARTPTS[v{index}];\
             [0:a]atrim=start={start:.3}:end={end:.3},asetpts=PTS-STARTPTS[a{index}];",
            start = segment.start(),
            end = segment.end(),
            index = index,
        ));
        concat_inputs.push_str(&format!("[v{index}][a{index}]", index = index));
    }

    graph.push_str(&format!(
        "{}concat=n={}:v=1:a=1[outv][outa]",
        concat_inputs,
        segments.len()
    ));
    graph
}

/// Build the ffmpeg command for a transcode request.
///
/// The encoder preset depends on the acceleration mode: `h264_nvenc` with
/// the quality-tuned VBR profile under CUDA, `libx264` slow/film otherwise.
/// Audio is always AAC 256k stereo with a 20 kHz cutoff.
pub fn build_transcode_command(req: &TranscodeRequest, hwaccel: HwAccel) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-nostdin"]);

    if hwaccel == HwAccel::Cuda {
        cmd.args(["-hwaccel", "cuda"]);
    }

    cmd.arg("-i").arg(&req.input);
    cmd.arg("-filter_complex").arg(build_filter_graph(&req.segments));
    cmd.args(["-map", "[outv]", "-map", "[outa]"]);

    match hwaccel {
        HwAccel::Cuda => {
            cmd.args([
                "-c:v",
                "h264_nvenc",
                "-preset:v",
                "p7",
                "-tune:v",
                "hq",
                "-rc:v",
                "vbr",
                "-cq:v",
                "28",
                "-profile:v",
                "high",
            ]);
        }
        HwAccel::None => {
            cmd.args([
                "-c:v", "libx264", "-preset", "slow", "-tune", "film", "-crf", "23",
                "-profile:v", "high",
            ]);
        }
    }

    cmd.args([
        "-c:a", "aac", "-cutoff", "20K", "-b:a", "256k", "-ac", "2",
    ]);
    cmd.args(["-dn", "-sn", "-y"]);
    cmd.arg(&req.output);

    cmd
}

/// Execute a transcode, forwarding fractional progress.
///
/// `total_duration` is the expected output duration used to normalize the
/// `time=` counters. The stop flag is checked between stderr lines; on
/// stop the child is killed and [`MediaError::Cancelled`] is returned.
pub fn run_transcode(
    req: &TranscodeRequest,
    hwaccel: HwAccel,
    total_duration: f64,
    on_progress: &mut dyn FnMut(f64),
    stop: &StopFlag,
) -> Result<(), MediaError> {
    let mut cmd = build_transcode_command(req, hwaccel);
    info!(
        input = %req.input.display(),
        output = %req.output.display(),
        "Running transcode"
    );

    run_with_progress(&mut cmd, total_duration, on_progress, stop, &mut |_| {})
}

/// Drive an ffmpeg command to completion, parsing `time=` progress from its
/// stderr and feeding every line to `on_line` (detection filters extract
/// their hits there). Shared by the transcode and detection runners.
pub(super) fn run_with_progress(
    cmd: &mut Command,
    total_duration: f64,
    on_progress: &mut dyn FnMut(f64),
    stop: &StopFlag,
    on_line: &mut dyn FnMut(&str),
) -> Result<(), MediaError> {
    let mut child = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| MediaError::Spawn {
            tool: "ffmpeg",
            source,
        })?;

    let stderr = child.stderr.take().expect("stderr was piped");
    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

    // ffmpeg separates progress updates with lone carriage returns; split on
    // both so counters and filter lines arrive as individual pieces.
    for chunk in BufReader::new(stderr).split(b'\r') {
        let chunk = chunk?;
        let text = String::from_utf8_lossy(&chunk);

        for piece in text.split('\n').map(str::trim).filter(|p| !p.is_empty()) {
            if stop.is_set() {
                warn!("Stop requested, killing ffmpeg");
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaError::Cancelled);
            }

            if tail.len() == DIAGNOSTIC_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(piece.to_string());

            on_line(piece);

            if let Some(captures) = time_pattern().captures(piece) {
                if let Ok(position) = position_in_seconds(&captures[1]) {
                    let fraction = if total_duration > 0.0 {
                        (position / total_duration).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    on_progress(fraction);
                }
            } else {
                debug!("{}", piece);
            }
        }
    }

    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(MediaError::CommandFailed {
                code,
                tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
            }),
            None => Err(MediaError::Terminated),
        }
    }
}
