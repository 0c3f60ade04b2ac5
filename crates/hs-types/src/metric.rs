//! Optimization metrics and directions.
//!
//! A study optimizes either one metric or an ordered list of metrics; the
//! hyperparameter document may spell both as a scalar or a list, so the
//! specs deserialize untagged.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, HsResult};

/// Whether a metric is minimized or maximized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Minimize
    }
}

impl Direction {
    /// True when `candidate` improves on `incumbent` under this direction.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Minimize => candidate < incumbent,
            Self::Maximize => candidate > incumbent,
        }
    }
}

/// The metric(s) a study optimizes, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricSpec {
    Single(String),
    Multi(Vec<String>),
}

impl MetricSpec {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Single(name) => vec![name.as_str()],
            Self::Multi(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }
}

/// The direction(s) matching [`MetricSpec`], scalar or list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectionSpec {
    Single(Direction),
    Multi(Vec<Direction>),
}

impl DirectionSpec {
    pub fn directions(&self) -> Vec<Direction> {
        match self {
            Self::Single(d) => vec![*d],
            Self::Multi(ds) => ds.clone(),
        }
    }

    /// The metric and direction declarations must agree in arity.
    pub fn check_against(&self, metrics: &MetricSpec) -> HsResult<()> {
        let metrics_len = metrics.names().len();
        let directions_len = self.directions().len();
        if metrics_len != directions_len {
            return Err(ConfigError::DirectionMetricMismatch {
                metrics: metrics_len,
                directions: directions_len,
            }
            .into());
        }
        Ok(())
    }
}

/// What the objective adapter hands back to the study: one value for a
/// single-objective study, an ordered list for a multi-objective one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectiveValue {
    Single(f64),
    Multi(Vec<f64>),
}

impl ObjectiveValue {
    /// The leading value, used for best-trial ordering in single-objective
    /// studies.
    pub fn primary(&self) -> Option<f64> {
        match self {
            Self::Single(v) => Some(*v),
            Self::Multi(vs) => vs.first().copied(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Single(v) => vec![*v],
            Self::Multi(vs) => vs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_improves() {
        assert!(Direction::Minimize.improves(0.1, 0.5));
        assert!(!Direction::Minimize.improves(0.5, 0.1));
        assert!(Direction::Maximize.improves(0.9, 0.5));
    }

    #[test]
    fn metric_spec_parses_scalar_and_list() {
        let single: MetricSpec = serde_yaml::from_str("val_loss").unwrap();
        assert_eq!(single.names(), vec!["val_loss"]);
        assert!(single.is_single());

        let multi: MetricSpec = serde_yaml::from_str("[val_loss, latency]").unwrap();
        assert_eq!(multi.names(), vec!["val_loss", "latency"]);
        assert!(!multi.is_single());
    }

    #[test]
    fn direction_spec_arity_check() {
        let metrics: MetricSpec = serde_yaml::from_str("[val_loss, latency]").unwrap();
        let directions: DirectionSpec = serde_yaml::from_str("minimize").unwrap();
        assert!(directions.check_against(&metrics).is_err());

        let directions: DirectionSpec = serde_yaml::from_str("[minimize, minimize]").unwrap();
        assert!(directions.check_against(&metrics).is_ok());
    }

    #[test]
    fn objective_value_primary() {
        assert_eq!(ObjectiveValue::Single(0.5).primary(), Some(0.5));
        assert_eq!(ObjectiveValue::Multi(vec![1.0, 2.0]).primary(), Some(1.0));
    }
}
