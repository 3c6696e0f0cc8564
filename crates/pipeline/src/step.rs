//! Weighted-cost resumable step runner.
//!
//! A job is an ordered chain of heterogeneous, possibly expensive
//! operations run as one logical unit. Each step splits into three phases:
//! a side-effect-light `before_perform` for planning and fast-fail checks,
//! the long-running `perform` streaming fractional progress, and an
//! `after_perform` post-condition validation. Progress across the chain is
//! weighted by each step's cost so a caller can render one continuous bar
//! over, say, an 80% transcode and a 20% archive.
//!
//! Steps are stateless templates; mutable scratch state lives in the
//! context or in step-local fields established during `before_perform`.
//! Every job owns its own chain instance, so nothing is shared across
//! concurrent workers.

use thiserror::Error;

use crate::backup::BackupError;
use crate::destination::DestinationError;
use crate::media::MediaError;

/// Error taxonomy of a step chain run.
#[derive(Debug, Error)]
pub enum StepError {
    /// Not a failure: the chain found its work already done and
    /// short-circuited (e.g. a valid destination already exists)
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Recoverable planning failure; the job can be retried
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Fatal post-condition failure; the job is left for manual inspection
    #[error("Post-condition failed: {0}")]
    PostCondition(String),

    /// A step was declared with a non-positive cost
    #[error("Step cost must be positive, got {0}")]
    InvalidCost(f64),

    /// Toolkit failure underneath a step
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Backup policy failure
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Destination resolution failure
    #[error(transparent)]
    Destination(#[from] DestinationError),

    /// IO failure inside a step
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepError {
    /// Whether the chain was stopped by an external cancellation rather
    /// than failing; a cancelled job stays claimed for a future re-claim.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Media(MediaError::Cancelled))
    }
}

/// One node of a step chain, generic over the job context it mutates.
pub trait Step<C> {
    /// Human-readable description for progress display.
    fn description(&self) -> String;

    /// Positive weight of this step relative to its chain.
    fn cost(&self) -> f64;

    /// Planning and fast-fail checks; runs before any progress is emitted.
    fn before_perform(&mut self, _ctx: &mut C) -> Result<(), StepError> {
        Ok(())
    }

    /// The actual work, streaming fractional progress in `[0, 1]`. May
    /// suspend for long wall-clock periods (an external transcode).
    fn perform(
        &mut self,
        ctx: &mut C,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<(), StepError>;

    /// Post-condition validation; a failure here fails the whole chain.
    fn after_perform(&mut self, _ctx: &mut C) -> Result<(), StepError> {
        Ok(())
    }
}

/// Cost-weighted progress of a running chain. Transient: produced
/// continuously while the chain executes, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StepProgress {
    /// Index of the active step in the chain
    pub step_index: usize,
    /// Description of the active step
    pub description: String,
    /// Progress of the active step in `[0, 1]`
    pub step_percent: f64,
    /// Cost-weighted position across the whole chain in `[0, 1]`
    pub total_percent: f64,
}

/// An ordered, owned list of steps executed as one job.
pub struct StepChain<C> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C> StepChain<C> {
    pub fn new(steps: Vec<Box<dyn Step<C>>>) -> Self {
        Self { steps }
    }

    /// Total declared cost of the chain.
    pub fn total_cost(&self) -> f64 {
        self.steps.iter().map(|step| step.cost()).sum()
    }

    /// Execute every step in order, reporting cost-weighted progress after
    /// each tick. The cumulative percent is monotonically non-decreasing
    /// and reaches exactly 1.0 at the end of the last step.
    pub fn process_all(
        &mut self,
        ctx: &mut C,
        observer: &mut dyn FnMut(StepProgress),
    ) -> Result<(), StepError> {
        let total_cost = self.total_cost();
        if let Some(bad) = self.steps.iter().find(|step| step.cost() <= 0.0) {
            return Err(StepError::InvalidCost(bad.cost()));
        }

        let mut completed_cost = 0.0;

        for (step_index, step) in self.steps.iter_mut().enumerate() {
            let cost = step.cost();
            let description = step.description();

            step.before_perform(ctx)?;

            // Clamp and keep the step-local percent monotonic even if the
            // external progress source regresses.
            let mut high_water = 0.0f64;
            let mut emit = |step_percent: f64| {
                high_water = high_water.max(step_percent.clamp(0.0, 1.0));
                observer(StepProgress {
                    step_index,
                    description: description.clone(),
                    step_percent: high_water,
                    total_percent: (completed_cost + cost * high_water) / total_cost,
                });
            };

            step.perform(ctx, &mut emit)?;
            step.after_perform(ctx)?;

            completed_cost += cost;
            observer(StepProgress {
                step_index,
                description: description.clone(),
                step_percent: 1.0,
                total_percent: completed_cost / total_cost,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Trace {
        calls: Vec<String>,
    }

    struct RecordedStep {
        name: &'static str,
        cost: f64,
        ticks: Vec<f64>,
        fail_before: Option<fn() -> StepError>,
        fail_after: bool,
    }

    impl RecordedStep {
        fn new(name: &'static str, cost: f64, ticks: Vec<f64>) -> Self {
            Self {
                name,
                cost,
                ticks,
                fail_before: None,
                fail_after: false,
            }
        }
    }

    impl Step<Trace> for RecordedStep {
        fn description(&self) -> String {
            self.name.to_string()
        }

        fn cost(&self) -> f64 {
            self.cost
        }

        fn before_perform(&mut self, ctx: &mut Trace) -> Result<(), StepError> {
            ctx.calls.push(format!("before:{}", self.name));
            if let Some(fail) = self.fail_before {
                return Err(fail());
            }
            Ok(())
        }

        fn perform(
            &mut self,
            ctx: &mut Trace,
            on_progress: &mut dyn FnMut(f64),
        ) -> Result<(), StepError> {
            ctx.calls.push(format!("perform:{}", self.name));
            for tick in &self.ticks {
                on_progress(*tick);
            }
            Ok(())
        }

        fn after_perform(&mut self, ctx: &mut Trace) -> Result<(), StepError> {
            ctx.calls.push(format!("after:{}", self.name));
            if self.fail_after {
                return Err(StepError::PostCondition("output too short".to_string()));
            }
            Ok(())
        }
    }

    fn run_chain(
        steps: Vec<Box<dyn Step<Trace>>>,
    ) -> (Result<(), StepError>, Trace, Vec<StepProgress>) {
        let mut chain = StepChain::new(steps);
        let mut ctx = Trace::default();
        let mut progress = Vec::new();
        let result = chain.process_all(&mut ctx, &mut |p| progress.push(p));
        (result, ctx, progress)
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_one() {
        let (result, _, progress) = run_chain(vec![
            Box::new(RecordedStep::new("process", 0.8, vec![0.25, 0.5, 0.75, 1.0])),
            Box::new(RecordedStep::new("backup", 0.2, vec![1.0])),
        ]);

        result.unwrap();
        assert!(!progress.is_empty());

        for pair in progress.windows(2) {
            assert!(
                pair[1].total_percent >= pair[0].total_percent,
                "{} then {}",
                pair[0].total_percent,
                pair[1].total_percent
            );
        }

        assert_eq!(progress.last().unwrap().total_percent, 1.0);
    }

    #[test]
    fn test_progress_is_cost_weighted() {
        let (result, _, progress) = run_chain(vec![
            Box::new(RecordedStep::new("process", 0.8, vec![0.5])),
            Box::new(RecordedStep::new("backup", 0.2, vec![])),
        ]);

        result.unwrap();

        // Halfway through an 0.8-cost step is 40% of the whole chain.
        let halfway = progress
            .iter()
            .find(|p| p.step_percent == 0.5)
            .expect("tick at 0.5");
        assert!((halfway.total_percent - 0.4).abs() < 1e-12);

        // End of the first step lands at its normalized cost.
        let boundary = progress
            .iter()
            .find(|p| p.step_index == 0 && p.step_percent == 1.0)
            .expect("first step completion");
        assert!((boundary.total_percent - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_regressing_external_progress_is_clamped() {
        let (result, _, progress) = run_chain(vec![Box::new(RecordedStep::new(
            "process",
            1.0,
            vec![0.5, 0.3, 1.4, -0.2],
        ))]);

        result.unwrap();
        for pair in progress.windows(2) {
            assert!(pair[1].total_percent >= pair[0].total_percent);
        }
        assert!(progress.iter().all(|p| (0.0..=1.0).contains(&p.total_percent)));
    }

    #[test]
    fn test_interrupted_before_perform_skips_perform() {
        let mut first = RecordedStep::new("process", 0.8, vec![0.5]);
        first.fail_before = Some(|| StepError::Interrupted("already exists".to_string()));

        let (result, ctx, progress) = run_chain(vec![
            Box::new(first),
            Box::new(RecordedStep::new("backup", 0.2, vec![])),
        ]);

        assert!(matches!(result, Err(StepError::Interrupted(_))));
        assert_eq!(ctx.calls, vec!["before:process"]);
        assert!(progress.is_empty());
    }

    #[test]
    fn test_post_condition_failure_stops_chain() {
        let mut first = RecordedStep::new("process", 0.8, vec![1.0]);
        first.fail_after = true;

        let (result, ctx, _) = run_chain(vec![
            Box::new(first),
            Box::new(RecordedStep::new("backup", 0.2, vec![])),
        ]);

        assert!(matches!(result, Err(StepError::PostCondition(_))));
        // The later step never starts.
        assert!(!ctx.calls.iter().any(|call| call.contains("backup")));
    }

    #[test]
    fn test_non_positive_cost_is_rejected() {
        let (result, ctx, _) = run_chain(vec![Box::new(RecordedStep::new("free", 0.0, vec![]))]);

        assert!(matches!(result, Err(StepError::InvalidCost(_))));
        assert!(ctx.calls.is_empty());
    }

    #[test]
    fn test_equal_costs_split_evenly() {
        let (result, _, progress) = run_chain(vec![
            Box::new(RecordedStep::new("a", 1.0, vec![])),
            Box::new(RecordedStep::new("b", 1.0, vec![])),
            Box::new(RecordedStep::new("c", 1.0, vec![])),
        ]);

        result.unwrap();
        let boundaries: Vec<f64> = progress
            .iter()
            .filter(|p| p.step_percent == 1.0)
            .map(|p| p.total_percent)
            .collect();

        assert_eq!(boundaries.len(), 3);
        assert!((boundaries[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((boundaries[1] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(boundaries[2], 1.0);
    }
}
