//! External media toolkit boundary.
//!
//! All pixel and audio work is delegated to ffmpeg/ffprobe subprocesses;
//! this module only builds commands, streams their progress and maps their
//! exit status. The [`MediaToolkit`] trait is the seam the processor sees,
//! so tests can substitute the toolkit without spawning anything.

pub mod filters;
pub mod probe;
pub mod transcode;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::stop::StopFlag;
use movie_pipeline_config::HwAccel;

pub use filters::{run_detect_filter, CropRegion, DetectOp, TimeWindow};
pub use probe::{audio_stream_count, media_duration};
pub use transcode::{build_transcode_command, run_transcode, TranscodeRequest};

/// Error type for media toolkit operations
#[derive(Debug, Error)]
pub enum MediaError {
    /// The external tool could not be started
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    /// ffprobe exited non-zero or produced unusable output
    #[error("ffprobe failed for {path}: {detail}")]
    ProbeFailed { path: PathBuf, detail: String },

    /// The probe succeeded but reported no duration
    #[error("No duration reported for {path}")]
    MissingDuration { path: PathBuf },

    /// ffmpeg exited with a non-zero status; carries the last lines of its
    /// diagnostic output
    #[error("ffmpeg failed with exit code {code}:\n{tail}")]
    CommandFailed { code: i32, tail: String },

    /// ffmpeg was terminated by a signal
    #[error("ffmpeg process was terminated by signal")]
    Terminated,

    /// The stop flag was raised mid-operation
    #[error("Stopped on external signal")]
    Cancelled,

    /// IO error while driving the subprocess
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The operations the pipeline needs from the external toolkit.
pub trait MediaToolkit: Send + Sync {
    /// Container duration of a media file, in seconds.
    fn duration(&self, path: &Path) -> Result<f64, MediaError>;

    /// Transcode the approved segments of `req.input` into `req.output`,
    /// reporting fractional progress in `[0, 1]`.
    fn transcode(
        &self,
        req: &TranscodeRequest,
        total_duration: f64,
        on_progress: &mut dyn FnMut(f64),
        stop: &StopFlag,
    ) -> Result<(), MediaError>;
}

/// The real toolkit: ffmpeg/ffprobe subprocesses.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    hwaccel: HwAccel,
}

impl FfmpegToolkit {
    pub fn new(hwaccel: HwAccel) -> Self {
        Self { hwaccel }
    }
}

impl MediaToolkit for FfmpegToolkit {
    fn duration(&self, path: &Path) -> Result<f64, MediaError> {
        media_duration(path)
    }

    fn transcode(
        &self,
        req: &TranscodeRequest,
        total_duration: f64,
        on_progress: &mut dyn FnMut(f64),
        stop: &StopFlag,
    ) -> Result<(), MediaError> {
        run_transcode(req, self.hwaccel, total_duration, on_progress, stop)
    }
}
