//! Trial records and the per-trial suggestion context.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hs_types::{
    HsResult, ParameterValue, StudyError, SuggestionKind, SuggestionSpec,
};

use crate::pruner::Pruner;

/// Lifecycle state of a trial. Pruned trials completed their evaluation but
/// were flagged unpromising by the pruner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Pruned,
    Failed,
}

/// One trial of the study: a parameter assignment and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    /// Trial sequence number; the ledger key.
    pub number: usize,
    pub parameters: HashMap<String, ParameterValue>,
    pub status: TrialStatus,
    /// Metric values in study-metric order, present once evaluated.
    pub values: Vec<f64>,
    pub pruned: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(number: usize, parameters: HashMap<String, ParameterValue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            parameters,
            status: TrialStatus::Pending,
            values: Vec::new(),
            pruned: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            worker_id: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self, worker_id: Option<String>) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
        self.worker_id = worker_id;
    }

    pub fn mark_completed(&mut self, values: Vec<f64>) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.values = values;
    }

    pub fn mark_pruned(&mut self, values: Vec<f64>) {
        self.status = TrialStatus::Pruned;
        self.pruned = true;
        self.finished_at = Some(Utc::now());
        self.values = values;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// True for trials that evaluated to the end, pruned or not.
    pub fn is_complete(&self) -> bool {
        matches!(self.status, TrialStatus::Completed | TrialStatus::Pruned)
    }

    /// Wall-clock seconds this trial took, once finished.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Per-trial suggestion context handed to the objective.
///
/// The study pre-samples a full parameter assignment from its search
/// strategy; the context serves typed suggestion calls out of that
/// assignment, records which parameters were actually requested, and relays
/// intermediate values to the pruner.
pub struct TrialContext<'a> {
    number: usize,
    assignment: HashMap<String, ParameterValue>,
    requested: HashMap<String, ParameterValue>,
    pruner: &'a mut dyn Pruner,
    last_report: Option<(usize, f64)>,
    prune_flagged: bool,
}

impl<'a> TrialContext<'a> {
    pub(crate) fn new(
        number: usize,
        assignment: HashMap<String, ParameterValue>,
        pruner: &'a mut dyn Pruner,
    ) -> Self {
        Self {
            number,
            assignment,
            requested: HashMap::new(),
            pruner,
            last_report: None,
            prune_flagged: false,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    fn lookup(&mut self, name: &str) -> HsResult<ParameterValue> {
        let value = self
            .assignment
            .get(name)
            .cloned()
            .ok_or_else(|| StudyError::UndeclaredParameter {
                name: name.to_string(),
            })?;
        self.requested.insert(name.to_string(), value.clone());
        Ok(value)
    }

    pub fn suggest_float(&mut self, name: &str) -> HsResult<f64> {
        let value = self.lookup(name)?;
        value.as_f64().ok_or_else(|| {
            hs_types::internal_error!("parameter {name} holds a non-numeric value {value}")
        })
    }

    pub fn suggest_loguniform(&mut self, name: &str) -> HsResult<f64> {
        self.suggest_float(name)
    }

    pub fn suggest_int(&mut self, name: &str) -> HsResult<i64> {
        match self.lookup(name)? {
            ParameterValue::Int(v) => Ok(v),
            ParameterValue::Float(v) => Ok(v.round() as i64),
            other => Err(hs_types::internal_error!(
                "parameter {name} holds a non-integer value {other}"
            )),
        }
    }

    pub fn suggest_categorical(&mut self, name: &str) -> HsResult<serde_json::Value> {
        match self.lookup(name)? {
            ParameterValue::Json(v) => Ok(v),
            ParameterValue::Int(v) => Ok(serde_json::Value::from(v)),
            ParameterValue::Float(v) => Ok(serde_json::Value::from(v)),
        }
    }

    /// Dispatch a declarative spec to the matching typed suggestion call.
    ///
    /// This is the adapter between the `parameters:` section and the
    /// suggestion API; an unrecognized `type` fails naming the parameter.
    pub fn suggest_from_spec(
        &mut self,
        name: &str,
        spec: &SuggestionSpec,
    ) -> HsResult<ParameterValue> {
        match spec.resolve_kind(name)? {
            SuggestionKind::Float => self.suggest_float(name).map(ParameterValue::Float),
            SuggestionKind::LogUniform => self.suggest_loguniform(name).map(ParameterValue::Float),
            SuggestionKind::Int => self.suggest_int(name).map(ParameterValue::Int),
            SuggestionKind::Categorical => {
                self.suggest_categorical(name).map(ParameterValue::Json)
            }
        }
    }

    /// Report an intermediate objective value (e.g. per-epoch loss) for
    /// pruning decisions.
    pub fn report(&mut self, step: usize, value: f64) {
        self.last_report = Some((step, value));
        self.pruner.report(self.number, step, value);
    }

    /// Ask the pruner whether this trial should stop early. Sticky: once
    /// flagged, the trial stays flagged.
    pub fn should_prune(&mut self) -> bool {
        if let Some((step, value)) = self.last_report {
            if self.pruner.should_prune(self.number, step, value) {
                self.prune_flagged = true;
            }
        }
        self.prune_flagged
    }

    pub fn was_pruned(&self) -> bool {
        self.prune_flagged
    }

    /// Parameters the objective actually requested.
    pub fn requested_params(&self) -> &HashMap<String, ParameterValue> {
        &self.requested
    }
}
