use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Hypersweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Study error: {0}")]
    Study(#[from] StudyError),

    #[error("Objective error: {0}")]
    Objective(#[from] ObjectiveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<csv::Error> for HsError {
    fn from(e: csv::Error) -> Self {
        HsError::Csv(e.to_string())
    }
}

/// Configuration-related errors. All of these are fatal at startup, before
/// any study object is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Missing required configuration key: {key}")]
    MissingKey { key: String },

    #[error("Unrecognized suggestion type \"{kind}\" for parameter {parameter}")]
    UnknownSuggestionType { parameter: String, kind: String },

    #[error("Invalid suggestion spec for parameter {parameter}: {message}")]
    InvalidSpec { parameter: String, message: String },

    #[error("Unrecognized sampler kind: {kind}")]
    UnknownSampler { kind: String },

    #[error("Unrecognized pruner kind: {kind}")]
    UnknownPruner { kind: String },

    #[error("Unrecognized objective: {name}")]
    UnknownObjective { name: String },

    #[error("Cannot parse wall-time value: {value}")]
    WallTime { value: String },

    #[error("Study declares {metrics} metric(s) but {directions} direction(s)")]
    DirectionMetricMismatch { metrics: usize, directions: usize },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Study-related errors
#[derive(Error, Debug)]
pub enum StudyError {
    #[error("Study not found in storage: {study}")]
    NotFound { study: String },

    #[error("Study storage failed: {message}")]
    StorageFailed { message: String },

    #[error("No parameter named {name} was declared in the search space")]
    UndeclaredParameter { name: String },

    #[error("Trial set is degenerate: {message}")]
    DegenerateTrials { message: String },

    #[error("Study {study} has no completed trials")]
    NoCompletedTrials { study: String },
}

/// Objective-adapter errors
#[derive(Error, Debug)]
pub enum ObjectiveError {
    #[error("The training routine must return the metric {metric}")]
    MissingMetric { metric: String },

    #[error("Training failed: {message}")]
    TrainingFailed { message: String },

    #[error("Trial ledger update failed: {message}")]
    LedgerFailed { message: String },
}

/// Result type alias for Hypersweep operations
pub type HsResult<T> = Result<T, HsError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::HsError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HsError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::UnknownSuggestionType {
            parameter: "model:optimizer:lr".to_string(),
            kind: "bogus".to_string(),
        };

        assert!(error.to_string().contains("bogus"));
        assert!(error.to_string().contains("model:optimizer:lr"));
    }

    #[test]
    fn test_error_conversion() {
        let config_error = ConfigError::MissingKey {
            key: "save_path".to_string(),
        };
        let hs_error: HsError = config_error.into();

        match hs_error {
            HsError::Config(_) => (),
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_missing_metric_message() {
        let error = ObjectiveError::MissingMetric {
            metric: "val_accuracy".to_string(),
        };
        assert!(error.to_string().contains("val_accuracy"));
    }

    #[test]
    fn test_macros() {
        let _validation_err = validation_error!("Invalid value: {}", 42);
        let _internal_err = internal_error!("Something went wrong");
    }
}
