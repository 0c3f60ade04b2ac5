//! Built-in benchmark objectives.
//!
//! These stand in for a real training routine so a study can be exercised
//! end to end: they read the suggested numeric parameters and report a
//! closed-form loss. Library consumers implement [`Objective`] themselves
//! and hand it to the runner directly.

use std::collections::HashMap;

use hs_objective::Objective;
use hs_study::TrialContext;
use hs_types::{ConfigError, HsResult, MetricSpec};

/// Sum of squares over every suggested numeric parameter. Minimum at the
/// origin.
pub struct SphereObjective {
    metrics: MetricSpec,
}

impl SphereObjective {
    pub fn new(metrics: MetricSpec) -> Self {
        Self { metrics }
    }
}

impl Objective for SphereObjective {
    fn train(
        &mut self,
        trial: &mut TrialContext,
        _config: &serde_yaml::Value,
    ) -> HsResult<HashMap<String, f64>> {
        let loss: f64 = numeric_params(trial).iter().map(|(_, v)| v * v).sum();
        trial.report(1, loss);
        Ok(fill_metrics(&self.metrics, loss))
    }
}

/// The Rosenbrock valley over the suggested numeric parameters in name
/// order. Minimum at (1, …, 1).
pub struct RosenbrockObjective {
    metrics: MetricSpec,
}

impl RosenbrockObjective {
    pub fn new(metrics: MetricSpec) -> Self {
        Self { metrics }
    }
}

impl Objective for RosenbrockObjective {
    fn train(
        &mut self,
        trial: &mut TrialContext,
        _config: &serde_yaml::Value,
    ) -> HsResult<HashMap<String, f64>> {
        let xs: Vec<f64> = numeric_params(trial).into_iter().map(|(_, v)| v).collect();
        let loss = if xs.len() < 2 {
            let x = xs.first().copied().unwrap_or(0.0);
            (1.0 - x).powi(2)
        } else {
            xs.windows(2)
                .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
                .sum()
        };
        trial.report(1, loss);
        Ok(fill_metrics(&self.metrics, loss))
    }
}

/// Suggested numeric parameters, sorted by name for a stable ordering.
fn numeric_params(trial: &TrialContext) -> Vec<(String, f64)> {
    let mut params: Vec<(String, f64)> = trial
        .requested_params()
        .iter()
        .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

/// Benchmarks report the same loss under every declared metric name, so the
/// metric contract holds for any study configuration.
fn fill_metrics(metrics: &MetricSpec, loss: f64) -> HashMap<String, f64> {
    metrics
        .names()
        .into_iter()
        .map(|name| (name.to_string(), loss))
        .collect()
}

/// Resolve a built-in objective by the name declared under `study.objective`.
pub fn resolve_objective(name: &str, metrics: &MetricSpec) -> HsResult<Box<dyn Objective>> {
    let objective: Box<dyn Objective> = match name {
        "sphere" => Box::new(SphereObjective::new(metrics.clone())),
        "rosenbrock" => Box::new(RosenbrockObjective::new(metrics.clone())),
        other => {
            return Err(ConfigError::UnknownObjective {
                name: other.to_string(),
            }
            .into())
        }
    };
    Ok(objective)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_names() {
        let metrics = MetricSpec::Single("val_loss".to_string());
        assert!(resolve_objective("sphere", &metrics).is_ok());
        assert!(resolve_objective("rosenbrock", &metrics).is_ok());
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let metrics = MetricSpec::Single("val_loss".to_string());
        let err = match resolve_objective("mnist", &metrics) {
            Ok(_) => panic!("expected an error for unknown objective"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("mnist"));
    }

    #[test]
    fn fill_metrics_covers_multi_objective() {
        let metrics = MetricSpec::Multi(vec!["val_loss".to_string(), "latency".to_string()]);
        let results = fill_metrics(&metrics, 0.25);
        assert_eq!(results.len(), 2);
        assert_eq!(results["latency"], 0.25);
    }
}
