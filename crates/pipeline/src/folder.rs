//! Concurrent folder runner.
//!
//! Processes every pending EDL in a directory with a bounded worker pool:
//! enumerate, fair-partition by source size, claim every bin member by
//! rename, then run one strictly sequential worker per bin, largest file
//! first. The claim rename happens before any worker starts, so no two
//! workers (or two runs) can pick up the same file. A failing item is
//! logged and skipped; a failing bin never aborts its siblings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::markers::{claim, claim_extension};
use crate::media::MediaToolkit;
use crate::partition::fair_partition;
use crate::processor::MovieFileProcessor;
use crate::progress::{new_shared_progress, SharedProgress};
use crate::scan::pending_edls;
use crate::stop::StopFlag;
use movie_pipeline_config::Settings;

/// Error type for directory runs
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The directory could not be enumerated
    #[error("Failed to enumerate {path}: {source}")]
    Enumerate {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An EDL could not be claimed for its worker
    #[error("Failed to claim {path}: {source}")]
    Claim {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A worker's execution task itself died (panic), as opposed to a
    /// caught per-item failure
    #[error("Worker {worker} execution died: {detail}")]
    WorkerDied { worker: usize, detail: String },
}

/// What one worker did with its bin.
#[derive(Debug)]
pub struct BinOutcome {
    pub worker: usize,
    /// Claim suffix this worker's files carry (`.pending_yml_<i>`)
    pub claim_ext: String,
    /// Files processed (or found already done) in bin order
    pub processed: Vec<PathBuf>,
    /// Files that failed, with the reason; they stay claimed on disk
    pub failed: Vec<(PathBuf, String)>,
}

impl BinOutcome {
    pub fn fully_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One claimed member of a worker's bin.
struct ClaimedEdl {
    path: PathBuf,
    source_size: u64,
}

/// Runs every pending EDL of one folder across a fixed worker pool.
pub struct FolderRunner {
    folder: PathBuf,
    edl_ext: String,
    nb_worker: usize,
    settings: Arc<Settings>,
    toolkit: Arc<dyn MediaToolkit>,
    progress: SharedProgress,
    stop: StopFlag,
}

impl FolderRunner {
    /// `edl_ext` overrides the configured extension (used to re-claim
    /// `.pending_yml_<i>` leftovers after a crash).
    pub fn new(
        folder: &Path,
        edl_ext: Option<&str>,
        settings: Arc<Settings>,
        toolkit: Arc<dyn MediaToolkit>,
        stop: StopFlag,
    ) -> Self {
        let nb_worker = settings.effective_nb_worker();
        let edl_ext = edl_ext
            .unwrap_or(settings.processor.edl_ext.as_str())
            .to_string();

        Self {
            folder: folder.to_path_buf(),
            edl_ext,
            nb_worker,
            settings,
            toolkit,
            progress: new_shared_progress(nb_worker),
            stop,
        }
    }

    /// Live aggregate progress of the current run.
    pub fn progress(&self) -> SharedProgress {
        Arc::clone(&self.progress)
    }

    /// Enumerate, partition fairly by source media size and claim every
    /// bin member by rename. Claims happen before any worker starts.
    fn prepare(&self) -> Result<Vec<Vec<ClaimedEdl>>, RunnerError> {
        let edls = pending_edls(&self.folder, &self.edl_ext).map_err(|source| {
            RunnerError::Enumerate {
                path: self.folder.clone(),
                source,
            }
        })?;

        let weighted: Vec<(PathBuf, u64)> = edls
            .into_iter()
            .map(|edl| {
                let source_size = edl
                    .with_extension("")
                    .metadata()
                    .map(|m| m.len())
                    .unwrap_or_else(|_| {
                        warn!(edl = %edl.display(), "Source missing, weighting as empty");
                        0
                    });
                (edl, source_size)
            })
            .collect();

        let groups = fair_partition(weighted, self.nb_worker, |(_, size)| *size);

        let mut bins = Vec::with_capacity(groups.len());
        for (worker, group) in groups.into_iter().enumerate() {
            let mut bin = Vec::with_capacity(group.len());
            for (edl, source_size) in group {
                let claimed = claim(&edl, worker).map_err(|source| RunnerError::Claim {
                    path: edl.clone(),
                    source,
                })?;
                info!(worker, edl = %claimed.display(), "Claimed");
                bin.push(ClaimedEdl {
                    path: claimed,
                    source_size,
                });
            }
            bins.push(bin);
        }

        Ok(bins)
    }

    /// Process the whole directory. Returns one outcome per worker; errors
    /// only when enumeration or claiming fails, or a worker task dies.
    pub async fn process_directory(&self) -> Result<Vec<BinOutcome>, RunnerError> {
        info!(folder = %self.folder.display(), workers = self.nb_worker, "Processing directory");

        let bins = self.prepare()?;

        {
            let mut board = self.progress.write().await;
            for (worker, bin) in bins.iter().enumerate() {
                board.set_bin_size(worker, bin.len());
            }
        }

        let mut handles = Vec::with_capacity(bins.len());
        for (worker, bin) in bins.into_iter().enumerate() {
            let settings = Arc::clone(&self.settings);
            let toolkit = Arc::clone(&self.toolkit);
            let progress = Arc::clone(&self.progress);
            let stop = self.stop.clone();

            handles.push((
                worker,
                tokio::task::spawn_blocking(move || {
                    run_bin(worker, bin, settings, toolkit, progress, stop)
                }),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut died: Option<RunnerError> = None;

        for (worker, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    if outcome.fully_succeeded() {
                        info!(worker, "Processed all {} EDL files", outcome.claim_ext);
                    } else {
                        error!(
                            worker,
                            failures = outcome.failed.len(),
                            "Bin finished with failures"
                        );
                    }
                    outcomes.push(outcome);
                }
                Err(join_error) => {
                    error!(worker, error = %join_error, "Worker execution died");
                    died.get_or_insert(RunnerError::WorkerDied {
                        worker,
                        detail: join_error.to_string(),
                    });
                }
            }
        }

        match died {
            Some(e) => Err(e),
            None => {
                info!(folder = %self.folder.display(), "All movie files processed");
                Ok(outcomes)
            }
        }
    }
}

/// Strictly sequential loop over one worker's bin, largest source first.
fn run_bin(
    worker: usize,
    mut bin: Vec<ClaimedEdl>,
    settings: Arc<Settings>,
    toolkit: Arc<dyn MediaToolkit>,
    progress: SharedProgress,
    stop: StopFlag,
) -> BinOutcome {
    // Front-load the longest jobs to minimize tail latency.
    bin.sort_by(|a, b| b.source_size.cmp(&a.source_size));

    let mut outcome = BinOutcome {
        worker,
        claim_ext: format!(".{}", claim_extension(worker)),
        processed: Vec::new(),
        failed: Vec::new(),
    };

    for claimed in &bin {
        if stop.is_set() {
            warn!(worker, "Stop requested, leaving remaining claims in place");
            return outcome;
        }

        progress.blocking_write().set_current(
            worker,
            Some(claimed.path.display().to_string()),
        );

        let mut consumed_units = 0.0f64;
        let result = MovieFileProcessor::new(
            &claimed.path,
            Arc::clone(&settings),
            Arc::clone(&toolkit),
            stop.clone(),
        )
        .map_err(|e| e.to_string())
        .and_then(|mut processor| {
            processor
                .process_with_progress(&mut |step_progress| {
                    let delta = step_progress.total_percent - consumed_units;
                    if delta > 0.0 {
                        consumed_units = step_progress.total_percent;
                        progress.blocking_write().advance(worker, delta);
                    }
                })
                .map_err(|e| {
                    if e.is_cancelled() {
                        "cancelled".to_string()
                    } else {
                        e.to_string()
                    }
                })
        });

        // Each file is worth exactly one unit in the aggregate, whatever
        // its outcome.
        progress
            .blocking_write()
            .advance(worker, 1.0 - consumed_units);

        match result {
            Ok(_) => {
                info!(worker, edl = %claimed.path.display(), "Processed successfully");
                outcome.processed.push(claimed.path.clone());
            }
            Err(reason) => {
                error!(worker, edl = %claimed.path.display(), reason, "Processing failed");
                outcome.failed.push((claimed.path.clone(), reason));
            }
        }
    }

    progress.blocking_write().mark_worker_done(worker);
    outcome
}
