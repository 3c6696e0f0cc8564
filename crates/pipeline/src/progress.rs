//! Shared progress aggregation for the folder runner.
//!
//! Workers accumulate progress into one [`ProgressBoard`] behind an async
//! RwLock; blocking worker tasks use `blocking_write`. Every file is worth
//! one unit inside its bin and every bin weighs the same in the overall
//! aggregate, so a file contributes equally to the total regardless of
//! which bin it landed in.

use std::sync::Arc;

use tokio::sync::RwLock;

/// Progress of one worker over its assigned bin.
#[derive(Debug, Clone, Default)]
pub struct WorkerProgress {
    /// Accumulated file units, in `[0, total_files]`
    pub completed_units: f64,
    /// Number of files assigned to this worker
    pub total_files: usize,
    /// Description of the file currently being processed
    pub current: Option<String>,
}

impl WorkerProgress {
    /// This worker's fraction in `[0, 1]`; an empty bin counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total_files == 0 {
            1.0
        } else {
            (self.completed_units / self.total_files as f64).clamp(0.0, 1.0)
        }
    }
}

/// Aggregate view over every worker of one folder run.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    workers: Vec<WorkerProgress>,
}

impl ProgressBoard {
    pub fn new(nb_worker: usize) -> Self {
        Self {
            workers: vec![WorkerProgress::default(); nb_worker],
        }
    }

    /// Declare the bin size of a worker before it starts.
    pub fn set_bin_size(&mut self, worker: usize, total_files: usize) {
        self.workers[worker].total_files = total_files;
    }

    /// Record which file a worker is on.
    pub fn set_current(&mut self, worker: usize, description: Option<String>) {
        self.workers[worker].current = description;
    }

    /// Advance a worker by a fraction of one file unit.
    pub fn advance(&mut self, worker: usize, delta_units: f64) {
        self.workers[worker].completed_units += delta_units;
    }

    /// Force a worker to its completed state.
    pub fn mark_worker_done(&mut self, worker: usize) {
        let worker = &mut self.workers[worker];
        worker.completed_units = worker.total_files as f64;
        worker.current = None;
    }

    pub fn worker(&self, worker: usize) -> &WorkerProgress {
        &self.workers[worker]
    }

    /// Overall fraction in `[0, 1]`: the mean of all worker fractions.
    pub fn overall_fraction(&self) -> f64 {
        if self.workers.is_empty() {
            return 1.0;
        }
        self.workers.iter().map(WorkerProgress::fraction).sum::<f64>() / self.workers.len() as f64
    }
}

/// Board shared between the runner and its worker tasks.
pub type SharedProgress = Arc<RwLock<ProgressBoard>>;

pub fn new_shared_progress(nb_worker: usize) -> SharedProgress {
    Arc::new(RwLock::new(ProgressBoard::new(nb_worker)))
}
