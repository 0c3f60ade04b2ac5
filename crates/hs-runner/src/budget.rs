//! Wall-clock budget arithmetic.
//!
//! Cluster schedulers kill the process hard at the wall-time limit, and
//! trials are expensive and non-resumable, so the loop must decide *before*
//! launching a trial whether it can plausibly finish. The estimate is
//! `mean + 2·stddev` of prior trial durations: a one-sided ~97.5th-percentile
//! margin under a normal approximation. With fewer than two samples there is
//! nothing to estimate from; the loop then stops once less than half the
//! allocation remains, and otherwise assumes one optimistic trial at 95% of
//! the remaining time.

/// Why the loop declined to launch another trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// The wall-time allocation is spent.
    Exhausted,
    /// The estimated next-trial duration exceeds the remaining time.
    EstimateExceedsRemaining { estimate: f64, remaining: f64 },
    /// Too few completed trials to estimate, and under half the allocation
    /// remains.
    TooFewSamples { remaining: f64 },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => write!(f, "wall-time allocation exhausted"),
            Self::EstimateExceedsRemaining {
                estimate,
                remaining,
            } => write!(
                f,
                "estimated run-time {estimate:.0}s exceeds the {remaining:.0}s remaining"
            ),
            Self::TooFewSamples { remaining } => write!(
                f,
                "under half the allocation remains ({remaining:.0}s) with too few trials to estimate from"
            ),
        }
    }
}

/// Decision for the next loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetDecision {
    /// Launch another trial, bounded by `timeout`.
    Proceed { timeout: f64, estimate: f64 },
    Stop(StopReason),
}

/// The caller-supplied hard wall-time limit, with the per-trial duration
/// estimate derived from completed trials.
#[derive(Debug, Clone, Copy)]
pub struct WallClockBudget {
    wall_limit: f64,
}

impl WallClockBudget {
    pub fn new(wall_limit_secs: f64) -> Self {
        Self {
            wall_limit: wall_limit_secs,
        }
    }

    pub fn wall_limit(&self) -> f64 {
        self.wall_limit
    }

    /// Decide whether another trial fits, given elapsed wall time and the
    /// durations of completed trials.
    pub fn decide(&self, elapsed_secs: f64, completed_durations: &[f64]) -> BudgetDecision {
        let remaining = self.wall_limit - elapsed_secs;
        if remaining <= 0.0 {
            return BudgetDecision::Stop(StopReason::Exhausted);
        }

        if completed_durations.len() >= 2 {
            let (mean, std) = mean_and_std(completed_durations);
            let estimate = mean + 2.0 * std;
            if remaining < estimate {
                return BudgetDecision::Stop(StopReason::EstimateExceedsRemaining {
                    estimate,
                    remaining,
                });
            }
            return BudgetDecision::Proceed {
                timeout: remaining,
                estimate,
            };
        }

        // Too little history to estimate from. Below half the allocation the
        // risk of a mid-trial kill outweighs one more attempt; above it,
        // assume a single optimistic trial.
        if remaining < self.wall_limit / 2.0 {
            return BudgetDecision::Stop(StopReason::TooFewSamples { remaining });
        }
        BudgetDecision::Proceed {
            timeout: remaining,
            estimate: 0.95 * remaining,
        }
    }
}

/// Mean and sample standard deviation (n−1).
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}
