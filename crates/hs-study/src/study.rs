//! Study facade: one-trial-at-a-time optimization over a search strategy,
//! with persistence after every trial.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use hs_types::{Direction, HsResult, ObjectiveValue};

use crate::pruner::Pruner;
use crate::search::SearchStrategy;
use crate::storage::{StudySnapshot, StudyStorage};
use crate::trial::{Trial, TrialContext, TrialStatus};

/// Identity and objective declaration for a study.
#[derive(Debug, Clone)]
pub struct StudyOptions {
    pub name: String,
    pub directions: Vec<Direction>,
    pub metrics: Vec<String>,
    pub worker_id: Option<String>,
}

impl StudyOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directions: vec![Direction::Minimize],
            metrics: vec!["loss".to_string()],
            worker_id: None,
        }
    }

    pub fn with_directions(mut self, directions: Vec<Direction>) -> Self {
        self.directions = directions;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_worker(mut self, worker_id: Option<String>) -> Self {
        self.worker_id = worker_id;
        self
    }
}

/// The objective callback invoked once per trial.
pub type ObjectiveFn<'a> = dyn FnMut(&mut TrialContext) -> HsResult<ObjectiveValue> + 'a;

/// A hyperparameter study: trials, the strategy producing them, and the
/// storage they persist to.
pub struct Study {
    snapshot: StudySnapshot,
    strategy: Box<dyn SearchStrategy>,
    pruner: Box<dyn Pruner>,
    storage: StudyStorage,
    worker_id: Option<String>,
}

impl Study {
    /// Create the study, resuming from storage when a study of the same name
    /// already exists and `load_if_exists` is set.
    pub fn create(
        options: StudyOptions,
        mut strategy: Box<dyn SearchStrategy>,
        pruner: Box<dyn Pruner>,
        storage: StudyStorage,
        load_if_exists: bool,
    ) -> HsResult<Self> {
        let snapshot = if load_if_exists && storage.exists(&options.name) {
            let snapshot = storage.load(&options.name)?;
            info!(
                "Loaded study {} with {} prior trial(s) from {}",
                snapshot.name,
                snapshot.trials.len(),
                storage.root().display()
            );

            // Replay history into the fresh strategy: advance past
            // already-consumed suggestions, then feed back observations.
            let _ = strategy.suggest(snapshot.trials.len());
            for trial in &snapshot.trials {
                if trial.is_complete() {
                    if let Some(value) = trial.values.first() {
                        strategy.report(&trial.parameters, *value);
                    }
                }
            }
            snapshot
        } else {
            let snapshot = StudySnapshot {
                id: Uuid::new_v4(),
                name: options.name.clone(),
                directions: options.directions.clone(),
                metrics: options.metrics.clone(),
                trials: Vec::new(),
            };
            storage.save(&snapshot)?;
            info!(
                "Created study {} at {}",
                snapshot.name,
                storage.root().display()
            );
            snapshot
        };

        Ok(Self {
            snapshot,
            strategy,
            pruner,
            storage,
            worker_id: options.worker_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    pub fn metrics(&self) -> &[String] {
        &self.snapshot.metrics
    }

    pub fn directions(&self) -> &[Direction] {
        &self.snapshot.directions
    }

    pub fn trials(&self) -> &[Trial] {
        &self.snapshot.trials
    }

    pub fn snapshot(&self) -> &StudySnapshot {
        &self.snapshot
    }

    pub fn successful_trials(&self) -> usize {
        self.snapshot.successful_trials()
    }

    pub fn completed_durations(&self) -> Vec<f64> {
        self.snapshot.completed_durations()
    }

    pub fn best_trial(&self) -> Option<&Trial> {
        self.snapshot.best_trial()
    }

    /// Run exactly one trial against `objective`.
    ///
    /// Returns the trial number, or `None` when no trial was launched (the
    /// timeout budget is spent, or the strategy has nothing left to
    /// suggest). A failing objective marks the trial failed, persists it,
    /// and propagates the error to the caller.
    pub fn optimize_one(
        &mut self,
        objective: &mut ObjectiveFn,
        timeout_secs: Option<f64>,
    ) -> HsResult<Option<usize>> {
        if let Some(timeout) = timeout_secs {
            if timeout <= 0.0 {
                warn!("No time budget left; not launching a trial");
                return Ok(None);
            }
        }

        let Some(assignment) = self.strategy.suggest(1).pop() else {
            warn!(
                "Search strategy {} has no further suggestions",
                self.strategy.name()
            );
            return Ok(None);
        };

        let number = self.snapshot.trials.len();
        let mut trial = Trial::new(number, assignment.clone());
        trial.mark_running(self.worker_id.clone());
        info!("Beginning trial {number}");

        let mut ctx = TrialContext::new(number, assignment, self.pruner.as_mut());
        match objective(&mut ctx) {
            Ok(value) => {
                let pruned = ctx.was_pruned();
                let values = value.values();
                if let Some(primary) = value.primary() {
                    self.strategy.report(&trial.parameters, primary);
                }
                if pruned {
                    info!("Trial {number} pruned");
                    trial.mark_pruned(values);
                } else {
                    trial.mark_completed(values);
                }
                self.snapshot.trials.push(trial);
                self.storage.save(&self.snapshot)?;
                Ok(Some(number))
            }
            Err(e) => {
                trial.mark_failed(e.to_string());
                self.snapshot.trials.push(trial);
                self.storage.save(&self.snapshot)?;
                Err(e)
            }
        }
    }
}

impl StudySnapshot {
    /// Completed trials, pruned included: the count the optimization loop
    /// compares against the requested trial budget.
    pub fn successful_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.is_complete()).count()
    }

    /// Durations in seconds of all completed trials.
    pub fn completed_durations(&self) -> Vec<f64> {
        self.trials
            .iter()
            .filter(|t| t.is_complete())
            .filter_map(Trial::duration_secs)
            .collect()
    }

    /// Best completed (non-pruned) trial by the leading metric. Undefined for
    /// multi-objective studies.
    pub fn best_trial(&self) -> Option<&Trial> {
        if self.directions.len() != 1 {
            return None;
        }
        let direction = self.directions[0];
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .filter(|t| !t.values.is_empty())
            .reduce(|best, t| {
                if direction.improves(t.values[0], best.values[0]) {
                    t
                } else {
                    best
                }
            })
    }

    /// Parameters of the best trial.
    pub fn best_params(&self) -> Option<&std::collections::HashMap<String, hs_types::ParameterValue>> {
        self.best_trial().map(|t| &t.parameters)
    }

    fn parameter_columns(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .trials
            .iter()
            .flat_map(|t| t.parameters.keys())
            .map(String::as_str)
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Write the full trial history as CSV: one row per trial, all metric
    /// and parameter columns.
    pub fn export_summary_csv<P: AsRef<Path>>(&self, path: P) -> HsResult<()> {
        let param_columns = self.parameter_columns();

        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let mut header = vec!["number".to_string(), "state".to_string()];
        for metric in &self.metrics {
            header.push(format!("value_{metric}"));
        }
        for name in &param_columns {
            header.push(format!("params_{name}"));
        }
        header.extend([
            "pruned".to_string(),
            "datetime_start".to_string(),
            "datetime_complete".to_string(),
            "duration_secs".to_string(),
        ]);
        writer.write_record(&header)?;

        for trial in &self.trials {
            let mut row = vec![trial.number.to_string(), format!("{:?}", trial.status)];
            for i in 0..self.metrics.len() {
                row.push(
                    trial
                        .values
                        .get(i)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            for name in &param_columns {
                row.push(
                    trial
                        .parameters
                        .get(name)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            row.push((trial.pruned as u8).to_string());
            row.push(
                trial
                    .started_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            );
            row.push(
                trial
                    .finished_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            );
            row.push(
                trial
                    .duration_secs()
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the single-objective optimization history (value and running
    /// best per trial) as plot-ready CSV.
    pub fn export_history_csv<P: AsRef<Path>>(&self, path: P) -> HsResult<()> {
        if self.directions.len() != 1 {
            return Err(hs_types::validation_error!(
                "optimization history is only defined for single-objective studies"
            ));
        }
        let direction = self.directions[0];

        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(["number", "value", "best_value"])?;

        let mut best: Option<f64> = None;
        for trial in self.trials.iter().filter(|t| t.is_complete()) {
            let Some(value) = trial.values.first().copied() else {
                continue;
            };
            best = Some(match best {
                Some(b) if !direction.improves(value, b) => b,
                _ => value,
            });
            let best_value = best.unwrap_or(value);
            writer.write_record(&[
                trial.number.to_string(),
                value.to_string(),
                best_value.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pruner::NopPruner;
    use crate::search::{RandomSearch, SearchSpace};
    use tempfile::tempdir;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .add_float("x", -5.0, 5.0)
            .add_int("n", 1, 10)
    }

    fn new_study(storage: StudyStorage) -> Study {
        let options = StudyOptions::new("quadratic")
            .with_directions(vec![Direction::Minimize])
            .with_metrics(vec!["loss".to_string()]);
        Study::create(
            options,
            Box::new(RandomSearch::new(space(), Some(11))),
            Box::new(NopPruner),
            storage,
            true,
        )
        .unwrap()
    }

    fn quadratic(ctx: &mut TrialContext) -> HsResult<ObjectiveValue> {
        let x = ctx.suggest_float("x")?;
        Ok(ObjectiveValue::Single(x * x))
    }

    #[test]
    fn optimize_one_records_completed_trial() {
        let dir = tempdir().unwrap();
        let mut study = new_study(StudyStorage::new(dir.path()).unwrap());

        let number = study.optimize_one(&mut quadratic, None).unwrap();
        assert_eq!(number, Some(0));
        assert_eq!(study.successful_trials(), 1);
        assert_eq!(study.trials()[0].status, TrialStatus::Completed);
    }

    #[test]
    fn exhausted_timeout_launches_nothing() {
        let dir = tempdir().unwrap();
        let mut study = new_study(StudyStorage::new(dir.path()).unwrap());

        let number = study.optimize_one(&mut quadratic, Some(0.0)).unwrap();
        assert_eq!(number, None);
        assert!(study.trials().is_empty());
    }

    #[test]
    fn failed_objective_is_persisted_and_propagated() {
        let dir = tempdir().unwrap();
        let storage = StudyStorage::new(dir.path()).unwrap();
        let mut study = new_study(storage.clone());

        let mut failing = |_ctx: &mut TrialContext| -> HsResult<ObjectiveValue> {
            Err(hs_types::internal_error!("training diverged"))
        };
        assert!(study.optimize_one(&mut failing, None).is_err());

        // Trial is recorded as failed, not lost.
        let loaded = storage.load("quadratic").unwrap();
        assert_eq!(loaded.trials.len(), 1);
        assert_eq!(loaded.trials[0].status, TrialStatus::Failed);
        assert_eq!(loaded.successful_trials(), 0);
    }

    #[test]
    fn best_trial_follows_direction() {
        let dir = tempdir().unwrap();
        let mut study = new_study(StudyStorage::new(dir.path()).unwrap());

        for _ in 0..5 {
            study.optimize_one(&mut quadratic, None).unwrap();
        }
        let best = study.best_trial().unwrap();
        for trial in study.trials() {
            assert!(best.values[0] <= trial.values[0]);
        }
    }

    #[test]
    fn load_if_exists_resumes_numbering() {
        let dir = tempdir().unwrap();
        let storage = StudyStorage::new(dir.path()).unwrap();

        let mut study = new_study(storage.clone());
        study.optimize_one(&mut quadratic, None).unwrap();
        study.optimize_one(&mut quadratic, None).unwrap();
        drop(study);

        let mut resumed = new_study(storage);
        assert_eq!(resumed.successful_trials(), 2);
        let number = resumed.optimize_one(&mut quadratic, None).unwrap();
        assert_eq!(number, Some(2));
    }

    #[test]
    fn summary_csv_contains_all_trials() {
        let dir = tempdir().unwrap();
        let mut study = new_study(StudyStorage::new(dir.path()).unwrap());
        for _ in 0..3 {
            study.optimize_one(&mut quadratic, None).unwrap();
        }

        let csv_path = dir.path().join("summary.csv");
        study.snapshot().export_summary_csv(&csv_path).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(text.lines().count(), 4); // header + 3 trials
        assert!(text.lines().next().unwrap().contains("value_loss"));
    }

    #[test]
    fn history_csv_tracks_running_best() {
        let dir = tempdir().unwrap();
        let mut study = new_study(StudyStorage::new(dir.path()).unwrap());
        for _ in 0..4 {
            study.optimize_one(&mut quadratic, None).unwrap();
        }

        let csv_path = dir.path().join("history.csv");
        study.snapshot().export_history_csv(&csv_path).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);

        // best_value is non-increasing for a minimized objective.
        let bests: Vec<f64> = lines[1..]
            .iter()
            .map(|l| l.split(',').nth(2).unwrap().parse().unwrap())
            .collect();
        for pair in bests.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }
}
