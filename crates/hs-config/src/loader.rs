//! Loading and validation of the two configuration documents.
//!
//! The hyperparameter document is typed: it declares the study, its search
//! space, and where results land. The model document stays an untyped YAML
//! tree because parameter paths index into user-defined structure the
//! harness knows nothing about.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use hs_types::{ConfigError, DirectionSpec, HsResult, MetricSpec, SuggestionSpec};

/// Top-level hyperparameter document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperConfig {
    /// Directory receiving all study outputs (log, ledgers, reports).
    pub save_path: PathBuf,

    /// Also append log records to `<save_path>/log.txt`.
    #[serde(default)]
    pub log: bool,

    pub study: StudySection,

    #[serde(default)]
    pub slurm: Option<SlurmSection>,
    #[serde(default)]
    pub pbs: Option<PbsSection>,
}

/// The `study:` section of the hyperparameter document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySection {
    pub name: String,

    /// Name of the objective implementation the run binary should resolve.
    #[serde(default)]
    pub objective: Option<String>,

    pub direction: DirectionSpec,
    pub metric: MetricSpec,

    #[serde(default = "default_n_trials")]
    pub n_trials: usize,

    /// GPU ordinals assigned to this worker; empty means CPU.
    #[serde(default)]
    pub gpu: Vec<u32>,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub pruner: PrunerConfig,

    #[serde(default)]
    pub storage: Option<StorageConfig>,

    /// Declarative search space: parameter path -> suggestion spec.
    pub parameters: BTreeMap<String, SuggestionSpec>,
}

fn default_n_trials() -> usize {
    100
}

/// Sampler descriptor. The kind selects one of the library's search
/// strategies; the remaining knobs apply to whichever strategy uses them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sampler_kind")]
    pub kind: String,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Steps per continuous dimension for grid search.
    #[serde(default = "default_grid_steps")]
    pub grid_steps: usize,
    /// Explore probability for Bayesian search.
    #[serde(default = "default_exploration_weight")]
    pub exploration_weight: f64,
}

fn default_sampler_kind() -> String {
    "random".to_string()
}

fn default_grid_steps() -> usize {
    5
}

fn default_exploration_weight() -> f64 {
    0.3
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            kind: default_sampler_kind(),
            seed: None,
            grid_steps: default_grid_steps(),
            exploration_weight: default_exploration_weight(),
        }
    }
}

/// Pruner descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunerConfig {
    #[serde(default = "default_pruner_kind")]
    pub kind: String,
    #[serde(default = "default_startup_trials")]
    pub n_startup_trials: usize,
    #[serde(default)]
    pub n_warmup_steps: usize,
}

fn default_pruner_kind() -> String {
    "none".to_string()
}

fn default_startup_trials() -> usize {
    5
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self {
            kind: default_pruner_kind(),
            n_startup_trials: default_startup_trials(),
            n_warmup_steps: 0,
        }
    }
}

/// Study-storage descriptor. Only the local JSON backend exists today;
/// cross-worker coordination belongs to whatever backend sits here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub kind: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_storage_kind() -> String {
    "local".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: default_storage_kind(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the storage root, defaulting to `<save_path>/studies`.
    pub fn root(&self, save_path: &Path) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => save_path.join("studies"),
        }
    }
}

/// SLURM batch section; `t` is the job wall-time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlurmSection {
    pub batch: SlurmBatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlurmBatch {
    #[serde(default)]
    pub t: Option<String>,
}

/// PBS batch section; the wall-time hides in the `l` resource list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbsSection {
    pub batch: PbsBatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbsBatch {
    #[serde(default)]
    pub l: Vec<String>,
}

const KNOWN_SAMPLERS: [&str; 3] = ["random", "grid", "bayesian"];
const KNOWN_PRUNERS: [&str; 2] = ["none", "median"];

impl HyperConfig {
    /// Validate the document. Everything here is fatal and must fire before
    /// any study object is touched.
    pub fn validate(&self) -> HsResult<()> {
        if self.study.name.is_empty() {
            return Err(ConfigError::MissingKey {
                key: "study.name".to_string(),
            }
            .into());
        }
        if self.study.n_trials == 0 {
            return Err(ConfigError::InvalidValue {
                key: "study.n_trials".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.study.metric.names().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "study.metric".to_string(),
            }
            .into());
        }

        self.study.direction.check_against(&self.study.metric)?;

        if !KNOWN_SAMPLERS.contains(&self.study.sampler.kind.as_str()) {
            return Err(ConfigError::UnknownSampler {
                kind: self.study.sampler.kind.clone(),
            }
            .into());
        }
        if !KNOWN_PRUNERS.contains(&self.study.pruner.kind.as_str()) {
            return Err(ConfigError::UnknownPruner {
                kind: self.study.pruner.kind.clone(),
            }
            .into());
        }
        if let Some(storage) = &self.study.storage {
            if storage.kind != "local" {
                return Err(ConfigError::InvalidValue {
                    key: "study.storage.kind".to_string(),
                    message: format!("unsupported backend {:?}", storage.kind),
                }
                .into());
            }
        }

        if self.study.parameters.is_empty() {
            return Err(ConfigError::MissingKey {
                key: "study.parameters".to_string(),
            }
            .into());
        }
        for (name, spec) in &self.study.parameters {
            spec.validate(name)?;
        }

        Ok(())
    }

    /// Storage descriptor, defaulted when the document omits one.
    pub fn storage(&self) -> StorageConfig {
        self.study.storage.clone().unwrap_or_default()
    }
}

fn read_document(path: &Path) -> HsResult<String> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(fs::read_to_string(path)?)
}

/// Load and validate the hyperparameter document.
pub fn load_hyper_config<P: AsRef<Path>>(path: P) -> HsResult<HyperConfig> {
    let text = read_document(path.as_ref())?;
    let config: HyperConfig = serde_yaml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

/// Load the model document as a raw YAML tree.
pub fn load_model_config<P: AsRef<Path>>(path: P) -> HsResult<serde_yaml::Value> {
    let text = read_document(path.as_ref())?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text)?;
    if !value.is_mapping() {
        return Err(hs_types::validation_error!(
            "model configuration {} is not a mapping",
            path.as_ref().display()
        ));
    }
    Ok(value)
}

/// Cross-document sanity checks.
///
/// Warns for every declared parameter whose head segment does not occur in
/// the model document; those parameters can still be applied by custom
/// objective logic, so this is not fatal.
pub fn config_check(hyper: &HyperConfig, model: &serde_yaml::Value) {
    for name in hyper.study.parameters.keys() {
        let head = name.split(':').next().unwrap_or(name);
        if model.get(head).is_none() {
            warn!(
                "Parameter {name} does not match any top-level key in the model configuration"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HYPER_YAML: &str = r#"
save_path: /tmp/hypersweep
log: true
study:
  name: mlp_tuning
  objective: sphere
  direction: minimize
  metric: val_loss
  n_trials: 20
  sampler:
    kind: random
    seed: 42
  parameters:
    model:optimizer:lr:
      type: loguniform
      low: 1.0e-5
      high: 1.0e-1
    model:dropout:
      type: float
      low: 0.0
      high: 0.5
    model:layers:
      type: int
      low: 1
      high: 4
slurm:
  batch:
    t: "12:00:00"
"#;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn full_document_parses_and_validates() {
        let f = write_temp(HYPER_YAML);
        let config = load_hyper_config(f.path()).unwrap();
        assert_eq!(config.study.name, "mlp_tuning");
        assert_eq!(config.study.n_trials, 20);
        assert_eq!(config.study.parameters.len(), 3);
        assert!(config.log);
        assert_eq!(config.study.sampler.seed, Some(42));
    }

    #[test]
    fn missing_file_fails_fast() {
        let err = load_hyper_config("/no/such/file.yml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn bogus_suggestion_type_fails_before_any_trial() {
        let broken = HYPER_YAML.replace("type: loguniform", "type: bogus");
        let f = write_temp(&broken);
        let err = load_hyper_config(f.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bogus"), "message was: {msg}");
        assert!(msg.contains("model:optimizer:lr"), "message was: {msg}");
    }

    #[test]
    fn unknown_sampler_rejected() {
        let broken = HYPER_YAML.replace("kind: random", "kind: annealing");
        let f = write_temp(&broken);
        assert!(load_hyper_config(f.path()).is_err());
    }

    #[test]
    fn direction_metric_arity_mismatch_rejected() {
        let broken = HYPER_YAML.replace("metric: val_loss", "metric: [val_loss, latency]");
        let f = write_temp(&broken);
        assert!(load_hyper_config(f.path()).is_err());
    }

    #[test]
    fn model_document_must_be_mapping() {
        let f = write_temp("- just\n- a\n- list\n");
        assert!(load_model_config(f.path()).is_err());
    }

    #[test]
    fn storage_root_defaults_under_save_path() {
        let f = write_temp(HYPER_YAML);
        let config = load_hyper_config(f.path()).unwrap();
        assert_eq!(
            config.storage().root(&config.save_path),
            PathBuf::from("/tmp/hypersweep/studies")
        );
    }
}
