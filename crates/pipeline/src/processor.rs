//! Movie file processor: one EDL in, one finished media file out.
//!
//! The job is a two-step chain. `ProcessStep` (cost 0.8) transcodes the
//! approved keep windows into the resolved destination, recovering from a
//! previous crash mid-encode and short-circuiting when a valid output
//! already exists. `BackupStep` (cost 0.2) applies the backup policy to the
//! source. Consumed EDLs end as a `.done` marker or move with their source
//! into the backup folder; a failed EDL stays in place, retryable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::backup::BackupPolicy;
use crate::destination::resolve_destination;
use crate::edl::{EdlError, EdlFile};
use crate::markers;
use crate::media::{MediaToolkit, TranscodeRequest};
use crate::segments::{total_duration, Segment};
use crate::step::{Step, StepChain, StepError, StepProgress};
use crate::stop::StopFlag;
use crate::title::RecordingTitle;
use movie_pipeline_config::Settings;

/// Relative cost of the transcode step in the chain.
const PROCESS_COST: f64 = 0.8;
/// Relative cost of the backup step in the chain.
const BACKUP_COST: f64 = 0.2;

/// Per-job aggregate owned by exactly one step chain instance.
pub struct ProcessingContext {
    pub edl: EdlFile,
    pub segments: Vec<Segment>,
    /// Expected output duration: the total of the approved keep windows
    pub expected_duration: f64,
    pub source_path: PathBuf,
    pub dest_filename: String,
    /// Resolved by `ProcessStep::before_perform`
    pub dest_filepath: Option<PathBuf>,
    pub settings: Arc<Settings>,
    pub toolkit: Arc<dyn MediaToolkit>,
    pub stop: StopFlag,
}

/// Transcode the approved keep windows into the destination file.
struct ProcessStep {
    description: String,
}

impl Step<ProcessingContext> for ProcessStep {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn cost(&self) -> f64 {
        PROCESS_COST
    }

    /// Resolve the destination and decide whether any work is left:
    /// a destination whose duration matches the EDL within the configured
    /// tolerance interrupts the chain (already done); a mismatched one is
    /// a leftover from a crashed encode and is deleted.
    fn before_perform(&mut self, ctx: &mut ProcessingContext) -> Result<(), StepError> {
        let dest_dir = resolve_destination(
            &RecordingTitle::new(&ctx.dest_filename),
            &ctx.settings,
        )?;
        let dest_filepath = dest_dir.join(&ctx.dest_filename);

        if dest_filepath.exists() {
            match ctx.toolkit.duration(&dest_filepath) {
                Ok(duration)
                    if (duration - ctx.expected_duration).abs()
                        <= ctx.settings.transcode.duration_tolerance_secs =>
                {
                    return Err(StepError::Interrupted(format!(
                        "Valid \"{}\" already exists",
                        dest_filepath.display()
                    )));
                }
                Ok(duration) => {
                    warn!(
                        dest = %dest_filepath.display(),
                        duration,
                        expected = ctx.expected_duration,
                        "Destination duration mismatch, deleting leftover"
                    );
                    std::fs::remove_file(&dest_filepath)?;
                }
                Err(e) => {
                    warn!(
                        dest = %dest_filepath.display(),
                        error = %e,
                        "Unreadable destination, deleting leftover"
                    );
                    std::fs::remove_file(&dest_filepath)?;
                }
            }
        }

        ctx.dest_filepath = Some(dest_filepath);
        Ok(())
    }

    fn perform(
        &mut self,
        ctx: &mut ProcessingContext,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), StepError> {
        let dest = ctx
            .dest_filepath
            .clone()
            .expect("destination resolved in before_perform");

        info!(
            source = %ctx.source_path.display(),
            dest = %dest.display(),
            "Processing"
        );

        let req = TranscodeRequest {
            input: ctx.source_path.clone(),
            output: dest,
            segments: ctx.segments.clone(),
        };

        ctx.toolkit
            .transcode(&req, ctx.expected_duration, on_progress, &ctx.stop)?;
        Ok(())
    }

    /// Re-validate the output duration; a mismatch means a truncated or
    /// corrupt encode and is never silently accepted.
    fn after_perform(&mut self, ctx: &mut ProcessingContext) -> Result<(), StepError> {
        let dest = ctx
            .dest_filepath
            .as_ref()
            .expect("destination resolved in before_perform");

        let actual = ctx
            .toolkit
            .duration(dest)
            .map_err(|e| StepError::PostCondition(format!("{} unreadable: {}", dest.display(), e)))?;

        if (actual - ctx.expected_duration).abs() > ctx.settings.transcode.duration_tolerance_secs {
            return Err(StepError::PostCondition(format!(
                "\"{}\" lasts {:.3}s, expected {:.3}s",
                dest.display(),
                actual,
                ctx.expected_duration
            )));
        }

        Ok(())
    }
}

/// Apply the backup policy to the source recording.
struct BackupStep {
    description: String,
}

impl Step<ProcessingContext> for BackupStep {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn cost(&self) -> f64 {
        BACKUP_COST
    }

    fn perform(
        &mut self,
        ctx: &mut ProcessingContext,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), StepError> {
        let policy = BackupPolicy::new(&ctx.edl, &ctx.settings);
        let outcome = policy.execute(&ctx.source_path)?;
        info!(?outcome, "Backup policy applied");

        on_progress(1.0);
        Ok(())
    }
}

/// How a processor run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The full chain ran: output produced, backup policy applied
    Processed,
    /// A valid output already existed; the EDL was marked done without
    /// re-encoding
    AlreadyDone,
}

/// Binds one EDL to its Process -> Backup step chain.
pub struct MovieFileProcessor {
    context: ProcessingContext,
    chain: StepChain<ProcessingContext>,
}

impl MovieFileProcessor {
    /// Load and validate the EDL, then assemble the chain.
    pub fn new(
        edl_path: &Path,
        settings: Arc<Settings>,
        toolkit: Arc<dyn MediaToolkit>,
        stop: StopFlag,
    ) -> Result<Self, EdlError> {
        let edl = EdlFile::load(edl_path)?;

        let segments = edl.content.segments.clone();
        let expected_duration = total_duration(&segments);
        let source_path = edl.source_path();
        let dest_filename = edl.content.filename.clone();

        let context = ProcessingContext {
            edl,
            segments,
            expected_duration,
            source_path,
            dest_filename: dest_filename.clone(),
            dest_filepath: None,
            settings,
            toolkit,
            stop,
        };

        let chain = StepChain::new(vec![
            Box::new(ProcessStep {
                description: dest_filename.clone(),
            }),
            Box::new(BackupStep {
                description: format!("Backing up {}", dest_filename),
            }),
        ]);

        Ok(Self { context, chain })
    }

    pub fn dest_filename(&self) -> &str {
        &self.context.dest_filename
    }

    /// Run the chain, discarding progress.
    pub fn process(&mut self) -> Result<ProcessOutcome, StepError> {
        self.process_with_progress(&mut |_| {})
    }

    /// Run the chain, forwarding cost-weighted progress to `observer`.
    ///
    /// An `Interrupted` signal from the chain is not an error: the
    /// destination is already valid, so the EDL is marked done and no
    /// transcode happens. Cancellations and real failures propagate, the
    /// EDL staying claimed for a future retry.
    pub fn process_with_progress(
        &mut self,
        observer: &mut dyn FnMut(StepProgress),
    ) -> Result<ProcessOutcome, StepError> {
        match self.chain.process_all(&mut self.context, observer) {
            Ok(()) => {
                info!(filename = %self.context.dest_filename, "Processed successfully");
                Ok(ProcessOutcome::Processed)
            }
            Err(StepError::Interrupted(reason)) => {
                info!(reason, "Nothing to do, deactivating decision file");
                markers::mark_done(&self.context.edl.path)?;
                Ok(ProcessOutcome::AlreadyDone)
            }
            Err(e) => Err(e),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::FakeToolkit;
    use std::fs;
    use tempfile::TempDir;

    const EDL_BODY: &str = "filename: Movie Name.mp4\n\
         segments: 00:00:03.370-00:00:05.960,00:00:10.520-00:00:18.200,00:00:20.320-00:00:25.080,\n";

    struct Fixture {
        dir: TempDir,
        settings: Arc<Settings>,
        edl_path: PathBuf,
        source_path: PathBuf,
    }

    fn fixture(edl_body: &str) -> Fixture {
        let dir = TempDir::new().unwrap();

        let mut settings = Settings::default();
        settings.paths.movies_folder = dir.path().join("Films");
        settings.paths.series_folder = dir.path().join("Séries");
        let backup = dir.path().join("backup");
        fs::create_dir(&backup).unwrap();
        settings.paths.backup_folder = Some(backup);

        let source_path = dir.path().join("channel 1_Movie Name_2022.mp4");
        fs::write(&source_path, "1800.0\n").unwrap();

        let edl_path = dir.path().join("channel 1_Movie Name_2022.mp4.yml");
        fs::write(&edl_path, edl_body).unwrap();

        Fixture {
            dir,
            settings: Arc::new(settings),
            edl_path,
            source_path,
        }
    }

    fn processor_with(fixture: &Fixture, toolkit: FakeToolkit) -> MovieFileProcessor {
        MovieFileProcessor::new(
            &fixture.edl_path,
            Arc::clone(&fixture.settings),
            Arc::new(toolkit),
            StopFlag::new(),
        )
        .unwrap()
    }

    fn dest_path(fixture: &Fixture) -> PathBuf {
        fixture
            .dir
            .path()
            .join("Films")
            .join("Movie Name")
            .join("Movie Name.mp4")
    }

    #[test]
    fn test_full_run_produces_output_and_archives_source() {
        let fixture = fixture(EDL_BODY);
        let mut processor = processor_with(&fixture, FakeToolkit::new());

        let outcome = processor.process().unwrap();

        assert_eq!(outcome, ProcessOutcome::Processed);
        assert!(dest_path(&fixture).exists());
        assert!(!fixture.source_path.exists());
        assert!(!fixture.edl_path.exists());

        let archived = fixture.dir.path().join("backup").join("Movie Name");
        assert!(archived.join("channel 1_Movie Name_2022.mp4").exists());
        assert!(archived.join("channel 1_Movie Name_2022.mp4.yml").exists());
    }

    #[test]
    fn test_skip_backup_leaves_source_and_marks_done() {
        let fixture = fixture(&format!("{}skip_backup: yes\n", EDL_BODY));
        let mut processor = processor_with(&fixture, FakeToolkit::new());

        processor.process().unwrap();

        assert!(dest_path(&fixture).exists());
        assert!(fixture.source_path.exists());
        assert!(!fixture.edl_path.exists());
        assert!(fixture
            .dir
            .path()
            .join("channel 1_Movie Name_2022.mp4.yml.done")
            .exists());
    }

    #[test]
    fn test_valid_destination_interrupts_without_transcode() {
        let fixture = fixture(EDL_BODY);

        // A previous run already produced a matching output (15.03s total).
        let dest = dest_path(&fixture);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "15.03\n").unwrap();

        let mut processor = processor_with(&fixture, FakeToolkit::new());
        let outcome = processor.process().unwrap();

        assert_eq!(outcome, ProcessOutcome::AlreadyDone);
        // Source untouched, EDL deactivated, output untouched.
        assert!(fixture.source_path.exists());
        assert!(!fixture.edl_path.exists());
        assert!(fixture
            .dir
            .path()
            .join("channel 1_Movie Name_2022.mp4.yml.done")
            .exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "15.03\n");
    }

    #[test]
    fn test_corrupt_destination_is_deleted_and_reencoded() {
        let fixture = fixture(EDL_BODY);

        // A crashed encode left an unreadable destination behind.
        let dest = dest_path(&fixture);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "not a duration").unwrap();

        let mut processor = processor_with(&fixture, FakeToolkit::new());
        let outcome = processor.process().unwrap();

        assert_eq!(outcome, ProcessOutcome::Processed);
        // The leftover was replaced by a valid encode.
        let content = fs::read_to_string(&dest).unwrap();
        assert!((content.trim().parse::<f64>().unwrap() - 15.03).abs() < 1e-9);
    }

    #[test]
    fn test_truncated_encode_fails_post_condition() {
        let fixture = fixture(EDL_BODY);

        let toolkit = FakeToolkit {
            duration_skew: 5.0,
            ..FakeToolkit::new()
        };
        let mut processor = processor_with(&fixture, toolkit);

        let result = processor.process();

        assert!(matches!(result, Err(StepError::PostCondition(_))));
        // The job is left unresolved for manual inspection.
        assert!(fixture.edl_path.exists());
        assert!(fixture.source_path.exists());
    }

    #[test]
    fn test_failed_transcode_leaves_edl_retryable() {
        let fixture = fixture(EDL_BODY);

        let toolkit = FakeToolkit {
            fail_transcode: Some(1),
            ..FakeToolkit::new()
        };
        let mut processor = processor_with(&fixture, toolkit);

        assert!(processor.process().is_err());
        assert!(fixture.edl_path.exists());
        assert!(fixture.source_path.exists());
    }

    #[test]
    fn test_cancellation_propagates_and_keeps_claim() {
        let fixture = fixture(EDL_BODY);
        let stop = StopFlag::new();
        stop.request_stop();

        let mut processor = MovieFileProcessor::new(
            &fixture.edl_path,
            Arc::clone(&fixture.settings),
            Arc::new(FakeToolkit::new()),
            stop,
        )
        .unwrap();

        let result = processor.process();

        assert!(matches!(result, Err(ref e) if e.is_cancelled()));
        assert!(fixture.edl_path.exists());
    }

    #[test]
    fn test_progress_reaches_one_on_success() {
        let fixture = fixture(EDL_BODY);
        let mut processor = processor_with(&fixture, FakeToolkit::new());

        let mut ticks = Vec::new();
        processor
            .process_with_progress(&mut |p| ticks.push(p.total_percent))
            .unwrap();

        assert_eq!(*ticks.last().unwrap(), 1.0);
        for pair in ticks.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_series_source_is_deleted_not_archived() {
        let fixture = fixture(
            "filename: Serie Name S01E23.mp4\n\
             segments: 00:00:03.370-00:00:05.960,00:00:10.520-00:00:18.200,00:00:20.320-00:00:25.080,\n",
        );
        let mut processor = processor_with(&fixture, FakeToolkit::new());

        processor.process().unwrap();

        let dest = fixture
            .dir
            .path()
            .join("Séries")
            .join("Serie Name")
            .join("Saison 1")
            .join("Serie Name S01E23.mp4");
        assert!(dest.exists());
        assert!(!fixture.source_path.exists());
        assert!(!fixture.edl_path.exists());
        // Nothing lands in the backup folder for series.
        assert_eq!(
            fs::read_dir(fixture.dir.path().join("backup")).unwrap().count(),
            0
        );
    }
}
