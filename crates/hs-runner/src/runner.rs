//! The optimization loop: one trial at a time until the trial budget is
//! met, the wall-clock budget says stop, the caller interrupts, or a trial
//! fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use hs_study::study::ObjectiveFn;
use hs_study::Study;
use hs_types::HsResult;

use crate::budget::{BudgetDecision, StopReason, WallClockBudget};

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStop {
    /// The requested number of successful trials was reached.
    TrialBudgetReached,
    /// The wall-clock budget declined another trial.
    WallClock(StopReason),
    /// The caller's interrupt flag was set. A normal stop, not an error.
    Interrupted,
    /// A trial failed; the loop stops rather than retry so persistent
    /// misconfiguration cannot hide behind retries.
    TrialFailed(String),
    /// The search strategy has nothing further to suggest.
    StrategyExhausted,
}

/// Summary of a finished optimization loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub successful_trials: usize,
    pub stop: RunStop,
}

/// Runs trials against a study under a wall-clock budget.
pub struct OptimizationRunner {
    n_trials: usize,
    budget: WallClockBudget,
    stop_flag: Arc<AtomicBool>,
    start: Instant,
}

impl OptimizationRunner {
    pub fn new(n_trials: usize, budget: WallClockBudget) -> Self {
        Self {
            n_trials,
            budget,
            stop_flag: Arc::new(AtomicBool::new(false)),
            start: Instant::now(),
        }
    }

    /// Shared flag a signal handler can set to stop the loop between trials.
    /// A trial already in progress is never cancelled.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    fn outcome(&self, study: &Study, stop: RunStop) -> RunOutcome {
        RunOutcome {
            successful_trials: study.successful_trials(),
            stop,
        }
    }

    /// Drive the loop to one of its stop conditions. Trial failures are
    /// reported in the outcome, not raised: trials already persisted stay
    /// valid and the process exits cleanly.
    pub fn run(&mut self, study: &mut Study, objective: &mut ObjectiveFn) -> HsResult<RunOutcome> {
        info!(
            "Running up to {} trial(s) within a {:.0}s wall-time allocation",
            self.n_trials,
            self.budget.wall_limit()
        );
        warn!("Trials that would cross the wall-time are not launched; the study resumes on the next job");

        loop {
            if study.successful_trials() >= self.n_trials {
                info!("Requested trial count reached");
                return Ok(self.outcome(study, RunStop::TrialBudgetReached));
            }
            if self.stop_flag.load(Ordering::SeqCst) {
                warn!("Received interrupt signal. Exiting between trials.");
                return Ok(self.outcome(study, RunStop::Interrupted));
            }

            let elapsed = self.start.elapsed().as_secs_f64();
            let remaining = self.budget.wall_limit() - elapsed;
            if remaining <= 0.0 {
                warn!("Stopping: {}", StopReason::Exhausted);
                return Ok(self.outcome(study, RunStop::WallClock(StopReason::Exhausted)));
            }

            match study.optimize_one(objective, Some(remaining)) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Ok(self.outcome(study, RunStop::StrategyExhausted));
                }
                Err(e) => {
                    warn!("Stopping after trial failure: {e}");
                    return Ok(self.outcome(study, RunStop::TrialFailed(e.to_string())));
                }
            }

            let elapsed = self.start.elapsed().as_secs_f64();
            match self.budget.decide(elapsed, &study.completed_durations()) {
                BudgetDecision::Proceed { estimate, .. } => {
                    info!(
                        "{:.0}s elapsed; next trial estimated at {estimate:.0}s",
                        elapsed
                    );
                }
                BudgetDecision::Stop(reason) => {
                    warn!("Stopping early: {reason}");
                    return Ok(self.outcome(study, RunStop::WallClock(reason)));
                }
            }
        }
    }
}
