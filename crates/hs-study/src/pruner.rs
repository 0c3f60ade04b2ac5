//! Early stopping of unpromising trials.

use std::collections::{BTreeMap, HashMap};

use hs_config::PrunerConfig;
use hs_types::{ConfigError, Direction, HsResult};

/// Decides whether a running trial should stop early based on its
/// intermediate values and those of prior trials.
pub trait Pruner: Send {
    fn should_prune(&self, trial_number: usize, step: usize, value: f64) -> bool;

    fn report(&mut self, trial_number: usize, step: usize, value: f64);
}

/// Intermediate values per trial and step.
#[derive(Debug, Clone, Default)]
pub struct TrialHistory {
    values: HashMap<usize, BTreeMap<usize, f64>>,
}

impl TrialHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, trial_number: usize, step: usize, value: f64) {
        self.values
            .entry(trial_number)
            .or_default()
            .insert(step, value);
    }

    /// All values reported at `step` across trials.
    pub fn step_values(&self, step: usize) -> Vec<f64> {
        self.values
            .values()
            .filter_map(|trial| trial.get(&step).copied())
            .collect()
    }
}

/// Never prunes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPruner;

impl Pruner for NopPruner {
    fn should_prune(&self, _trial_number: usize, _step: usize, _value: f64) -> bool {
        false
    }

    fn report(&mut self, _trial_number: usize, _step: usize, _value: f64) {}
}

/// Prunes a trial whose intermediate value is worse than the median of the
/// values other trials reported at the same step.
#[derive(Debug, Clone)]
pub struct MedianPruner {
    n_startup_trials: usize,
    n_warmup_steps: usize,
    direction: Direction,
    history: TrialHistory,
}

impl MedianPruner {
    pub fn new(direction: Direction) -> Self {
        Self {
            n_startup_trials: 5,
            n_warmup_steps: 0,
            direction,
            history: TrialHistory::new(),
        }
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_n_warmup_steps(mut self, n: usize) -> Self {
        self.n_warmup_steps = n;
        self
    }
}

impl Pruner for MedianPruner {
    fn should_prune(&self, trial_number: usize, step: usize, value: f64) -> bool {
        if trial_number < self.n_startup_trials || step < self.n_warmup_steps {
            return false;
        }

        let mut values = self.history.step_values(step);
        if values.is_empty() {
            return false;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = values[values.len() / 2];

        match self.direction {
            Direction::Minimize => value > median,
            Direction::Maximize => value < median,
        }
    }

    fn report(&mut self, trial_number: usize, step: usize, value: f64) {
        self.history.report(trial_number, step, value);
    }
}

/// Build the pruner named by the descriptor.
pub fn pruner_from_config(config: &PrunerConfig, direction: Direction) -> HsResult<Box<dyn Pruner>> {
    let pruner: Box<dyn Pruner> = match config.kind.as_str() {
        "none" => Box::new(NopPruner),
        "median" => Box::new(
            MedianPruner::new(direction)
                .with_n_startup_trials(config.n_startup_trials)
                .with_n_warmup_steps(config.n_warmup_steps),
        ),
        other => {
            return Err(ConfigError::UnknownPruner {
                kind: other.to_string(),
            }
            .into())
        }
    };
    Ok(pruner)
}
