//! Parameter values and the declarative suggestion specs that describe how
//! each hyperparameter is sampled.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, HsResult};

/// A concrete parameter value produced by a sampler.
///
/// Untagged, with `Int` ahead of `Float` so integer values survive a
/// serialize/deserialize round trip as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl ParameterValue {
    /// Numeric view of the value, where one exists. Categorical strings and
    /// booleans have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    /// Convert into a YAML node so the value can be spliced into a model
    /// configuration tree.
    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Self::Float(v) => serde_yaml::Value::from(*v),
            Self::Int(v) => serde_yaml::Value::from(*v),
            Self::Json(v) => serde_yaml::to_value(v).unwrap_or(serde_yaml::Value::Null),
        }
    }
}

/// Canonical suggestion types understood by the trial-suggestion adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    Float,
    LogUniform,
    Int,
    Categorical,
}

/// Declarative spec for one hyperparameter, as written in the
/// `parameters:` section of the hyperparameter document.
///
/// ```yaml
/// model:optimizer:lr:
///   type: loguniform
///   low: 1.0e-5
///   high: 1.0e-1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSpec {
    /// One of `float`/`uniform`, `loguniform`, `int`/`int_uniform`,
    /// `categorical`/`choice`.
    #[serde(rename = "type")]
    pub kind: String,

    pub low: Option<f64>,
    pub high: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<serde_json::Value>,

    /// Sample in log-space; `type: float` with `log: true` is equivalent to
    /// `type: loguniform`.
    #[serde(default)]
    pub log: bool,
}

impl SuggestionSpec {
    /// Resolve the declared `type` string, failing with the offending
    /// parameter name on anything unrecognized.
    pub fn resolve_kind(&self, parameter: &str) -> HsResult<SuggestionKind> {
        let kind = match self.kind.as_str() {
            "float" | "uniform" => {
                if self.log {
                    SuggestionKind::LogUniform
                } else {
                    SuggestionKind::Float
                }
            }
            "loguniform" => SuggestionKind::LogUniform,
            "int" | "int_uniform" => SuggestionKind::Int,
            "categorical" | "choice" => SuggestionKind::Categorical,
            other => {
                return Err(ConfigError::UnknownSuggestionType {
                    parameter: parameter.to_string(),
                    kind: other.to_string(),
                }
                .into())
            }
        };
        Ok(kind)
    }

    /// Validate that the spec carries the fields its kind needs.
    pub fn validate(&self, parameter: &str) -> HsResult<()> {
        match self.resolve_kind(parameter)? {
            SuggestionKind::Float | SuggestionKind::Int | SuggestionKind::LogUniform => {
                let (low, high) = match (self.low, self.high) {
                    (Some(low), Some(high)) => (low, high),
                    _ => {
                        return Err(ConfigError::InvalidSpec {
                            parameter: parameter.to_string(),
                            message: "numeric suggestion requires low and high".to_string(),
                        }
                        .into())
                    }
                };
                if low > high {
                    return Err(ConfigError::InvalidSpec {
                        parameter: parameter.to_string(),
                        message: format!("low {low} exceeds high {high}"),
                    }
                    .into());
                }
            }
            SuggestionKind::Categorical => {
                if self.choices.is_empty() {
                    return Err(ConfigError::InvalidSpec {
                        parameter: parameter.to_string(),
                        message: "categorical suggestion requires non-empty choices".to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}
