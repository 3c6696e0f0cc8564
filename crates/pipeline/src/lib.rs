//! Movie pipeline
//!
//! Turns approved PVR recordings into finished media files: parses edit
//! decision lists, transcodes only the approved time ranges through the
//! external media toolkit, applies the backup policy to the source, and
//! distributes whole directories of pending EDLs across a worker pool with
//! claim-based locking. Segment detection proposes the candidate keep
//! windows that operators approve into EDLs.

pub mod backup;
pub mod destination;
pub mod detect;
pub mod edl;
pub mod folder;
pub mod markers;
pub mod media;
pub mod partition;
pub mod processor;
pub mod progress;
pub mod scan;
pub mod segments;
pub mod step;
pub mod stop;
pub mod timecode;
pub mod title;

pub use movie_pipeline_config as config;
pub use movie_pipeline_config::Settings;

pub use backup::{BackupError, BackupOutcome, BackupPolicy};
pub use destination::{resolve_destination, DestinationError};
pub use detect::{
    detect_directory, detect_file, write_sidecar, AutoDetect, DetectError, DetectorKind,
    SegmentDetector,
};
pub use edl::{EdlContent, EdlError, EdlFile};
pub use folder::{BinOutcome, FolderRunner, RunnerError};
pub use markers::{claim, claim_path, done_marker_path, mark_done};
pub use media::{FfmpegToolkit, MediaError, MediaToolkit, TranscodeRequest};
pub use partition::fair_partition;
pub use processor::{MovieFileProcessor, ProcessOutcome, ProcessingContext};
pub use progress::{new_shared_progress, ProgressBoard, SharedProgress};
pub use scan::{pending_edls, scan_recordings, RecordingCandidate};
pub use segments::{
    humanize_segments, merge_adjacent_segments, merge_filtered_segments, parse_segments,
    DetectedSegment, Segment, SegmentError,
};
pub use step::{Step, StepChain, StepError, StepProgress};
pub use stop::StopFlag;
pub use timecode::{position_in_seconds, seconds_to_position};
pub use title::RecordingTitle;
