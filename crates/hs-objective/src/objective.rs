//! The objective adapter: wraps a user-supplied training routine, injects
//! suggested hyperparameters into the model configuration, validates the
//! returned metrics, and persists each trial to the worker's ledger.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use hs_config::tree;
use hs_study::TrialContext;
use hs_types::{HsResult, MetricSpec, ObjectiveError, ObjectiveValue, SuggestionSpec};

use crate::device::{devices_from_gpu, Device};
use crate::ledger::TrialLedger;

/// The user-owned extension point: train a model under the mutated
/// configuration and return a mapping from metric name to value.
///
/// Implementations are opaque to the harness. An error propagates to the
/// optimization loop, which treats it as fatal for the run.
pub trait Objective: Send {
    fn train(
        &mut self,
        trial: &mut TrialContext,
        config: &serde_yaml::Value,
    ) -> HsResult<HashMap<String, f64>>;
}

/// Per-worker properties, bound lazily on the first trial.
#[derive(Debug, Clone)]
pub struct WorkerBinding {
    pub worker_id: Option<String>,
    pub devices: Vec<Device>,
    pub results_path: PathBuf,
}

/// Drives one [`Objective`] through the trial state machine:
/// bind, configure, train, validate-and-persist.
pub struct ObjectiveAdapter {
    objective: Box<dyn Objective>,
    base_config: serde_yaml::Value,
    parameters: BTreeMap<String, SuggestionSpec>,
    metrics: MetricSpec,
    save_path: PathBuf,
    gpu: Vec<u32>,
    node_id: Option<String>,
    binding: Option<WorkerBinding>,
    ledger: Option<TrialLedger>,
}

impl ObjectiveAdapter {
    pub fn new(
        objective: Box<dyn Objective>,
        base_config: serde_yaml::Value,
        parameters: BTreeMap<String, SuggestionSpec>,
        metrics: MetricSpec,
        save_path: PathBuf,
    ) -> Self {
        Self {
            objective,
            base_config,
            parameters,
            metrics,
            save_path,
            gpu: Vec::new(),
            node_id: None,
            binding: None,
            ledger: None,
        }
    }

    pub fn with_worker(mut self, node_id: Option<String>) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_gpu(mut self, gpu: Vec<u32>) -> Self {
        self.gpu = gpu;
        self
    }

    pub fn binding(&self) -> Option<&WorkerBinding> {
        self.binding.as_ref()
    }

    /// Initialize per-worker properties: device assignment and the ledger
    /// file keyed by worker id. Deferred to the first trial rather than
    /// construction so a freshly built adapter stays cheap to move across
    /// the process.
    fn bind(&mut self) -> HsResult<()> {
        if self.binding.is_some() {
            return Ok(());
        }

        let devices = devices_from_gpu(&self.gpu);
        let results_dir = self.save_path.join("results");
        fs::create_dir_all(&results_dir)?;

        let file_name = match &self.node_id {
            Some(id) => format!("results_{id}.csv"),
            None => "results.csv".to_string(),
        };
        let results_path = results_dir.join(file_name);

        info!(
            "Worker {} bound",
            self.node_id.as_deref().unwrap_or("0")
        );
        info!("  optimizing metric(s) {:?}", self.metrics.names());
        info!(
            "  using device(s) {}",
            devices
                .iter()
                .map(Device::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!("  saving trial results to {}", results_path.display());

        self.ledger = Some(TrialLedger::new(&results_path));
        self.binding = Some(WorkerBinding {
            worker_id: self.node_id.clone(),
            devices,
            results_path,
        });
        Ok(())
    }

    /// Deep-copy the model document and apply every declared hyperparameter
    /// through the path updater, then audit the result.
    fn configure(&mut self, ctx: &mut TrialContext) -> HsResult<serde_yaml::Value> {
        info!("Updating the model configuration with suggested parameters");
        let mut conf = self.base_config.clone();

        for (name, spec) in &self.parameters {
            let value = ctx.suggest_from_spec(name, spec)?;
            if name.contains(':') {
                tree::update_colon_path(&mut conf, name, value.to_yaml());
            } else if conf.get(name.as_str()).is_some() {
                tree::update_path(&mut conf, &[name], value.to_yaml());
            }
            info!("  {name}: {value}");
        }

        let missing =
            tree::unmatched_parameters(self.parameters.keys().map(String::as_str), &conf);
        for name in &missing {
            warn!("  {name} was not auto-updated");
        }
        if !missing.is_empty() {
            warn!("Not all declared parameters were matched in the model configuration");
            warn!("If the objective applies those parameters itself, ignore this message");
        }

        Ok(conf)
    }

    /// Check the metric contract, record the trial in the ledger, and return
    /// the metric value(s) in study order.
    fn save(
        &mut self,
        ctx: &mut TrialContext,
        results: HashMap<String, f64>,
    ) -> HsResult<ObjectiveValue> {
        for metric in self.metrics.names() {
            if !results.contains_key(metric) {
                return Err(ObjectiveError::MissingMetric {
                    metric: metric.to_string(),
                }
                .into());
            }
        }

        let pruned = ctx.should_prune();
        if let Some(ledger) = self.ledger.as_mut() {
            ledger.append(ctx.number(), ctx.requested_params(), &results, pruned);
            ledger.save()?;
            info!(
                "Saved trial {} results to {}",
                ctx.number(),
                ledger.path().display()
            );
        }

        let value = match &self.metrics {
            MetricSpec::Single(name) => ObjectiveValue::Single(results[name]),
            MetricSpec::Multi(names) => {
                ObjectiveValue::Multi(names.iter().map(|name| results[name]).collect())
            }
        };
        Ok(value)
    }

    /// Run one full trial. This is what the optimization loop invokes.
    pub fn run_trial(&mut self, ctx: &mut TrialContext) -> HsResult<ObjectiveValue> {
        self.bind()?;
        let conf = self.configure(ctx)?;

        info!("Training trial {}", ctx.number());
        let results = self.objective.train(ctx, &conf)?;

        self.save(ctx, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_study::{
        pruner::NopPruner, search::SearchSpace, RandomSearch, Study, StudyOptions, StudyStorage,
    };
    use hs_types::Direction;
    use tempfile::tempdir;

    /// Reads the injected leaf and reports a quadratic loss on it.
    struct QuadraticObjective;

    impl Objective for QuadraticObjective {
        fn train(
            &mut self,
            _trial: &mut TrialContext,
            config: &serde_yaml::Value,
        ) -> HsResult<HashMap<String, f64>> {
            let x = config["model"]["x"].as_f64().unwrap_or(0.0);
            let mut results = HashMap::new();
            results.insert("val_loss".to_string(), x * x);
            Ok(results)
        }
    }

    /// Returns the wrong metric name, violating the contract.
    struct WrongMetricObjective;

    impl Objective for WrongMetricObjective {
        fn train(
            &mut self,
            _trial: &mut TrialContext,
            _config: &serde_yaml::Value,
        ) -> HsResult<HashMap<String, f64>> {
            let mut results = HashMap::new();
            results.insert("val_loss".to_string(), 0.5);
            Ok(results)
        }
    }

    fn specs() -> BTreeMap<String, SuggestionSpec> {
        let mut specs = BTreeMap::new();
        specs.insert(
            "model:x".to_string(),
            SuggestionSpec {
                kind: "float".to_string(),
                low: Some(-2.0),
                high: Some(2.0),
                choices: Vec::new(),
                log: false,
            },
        );
        specs
    }

    fn model_config() -> serde_yaml::Value {
        serde_yaml::from_str("model:\n  x: 0.0\n  hidden: 32\n").unwrap()
    }

    fn study(dir: &std::path::Path, metric: &str) -> Study {
        let space = SearchSpace::from_specs(&specs()).unwrap();
        Study::create(
            StudyOptions::new("adapter_test")
                .with_directions(vec![Direction::Minimize])
                .with_metrics(vec![metric.to_string()]),
            Box::new(RandomSearch::new(space, Some(5))),
            Box::new(NopPruner),
            StudyStorage::new(dir.join("studies")).unwrap(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn full_trial_writes_ledger_and_returns_metric() {
        let dir = tempdir().unwrap();
        let mut study = study(dir.path(), "val_loss");

        let mut adapter = ObjectiveAdapter::new(
            Box::new(QuadraticObjective),
            model_config(),
            specs(),
            MetricSpec::Single("val_loss".to_string()),
            dir.path().to_path_buf(),
        );

        let number = study
            .optimize_one(&mut |ctx| adapter.run_trial(ctx), None)
            .unwrap();
        assert_eq!(number, Some(0));

        let ledger_path = dir.path().join("results").join("results.csv");
        let text = std::fs::read_to_string(&ledger_path).unwrap();
        assert!(text.lines().next().unwrap().contains("val_loss"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn missing_metric_fails_without_ledger_write() {
        let dir = tempdir().unwrap();
        let mut study = study(dir.path(), "val_accuracy");

        let mut adapter = ObjectiveAdapter::new(
            Box::new(WrongMetricObjective),
            model_config(),
            specs(),
            MetricSpec::Single("val_accuracy".to_string()),
            dir.path().to_path_buf(),
        );

        let err = study
            .optimize_one(&mut |ctx| adapter.run_trial(ctx), None)
            .unwrap_err();
        assert!(err.to_string().contains("val_accuracy"));

        // No row may be persisted for the failed contract.
        let ledger_path = dir.path().join("results").join("results.csv");
        assert!(!ledger_path.exists());
    }

    #[test]
    fn worker_id_keys_the_ledger_file() {
        let dir = tempdir().unwrap();
        let mut study = study(dir.path(), "val_loss");

        let mut adapter = ObjectiveAdapter::new(
            Box::new(QuadraticObjective),
            model_config(),
            specs(),
            MetricSpec::Single("val_loss".to_string()),
            dir.path().to_path_buf(),
        )
        .with_worker(Some("node7".to_string()));

        study
            .optimize_one(&mut |ctx| adapter.run_trial(ctx), None)
            .unwrap();

        assert!(dir.path().join("results").join("results_node7.csv").exists());
        let binding = adapter.binding().unwrap();
        assert_eq!(binding.worker_id.as_deref(), Some("node7"));
        assert_eq!(binding.devices, vec![Device::Cpu]);
    }

    #[test]
    fn binding_happens_once() {
        let dir = tempdir().unwrap();
        let mut study = study(dir.path(), "val_loss");

        let mut adapter = ObjectiveAdapter::new(
            Box::new(QuadraticObjective),
            model_config(),
            specs(),
            MetricSpec::Single("val_loss".to_string()),
            dir.path().to_path_buf(),
        );
        assert!(adapter.binding().is_none());

        for _ in 0..3 {
            study
                .optimize_one(&mut |ctx| adapter.run_trial(ctx), None)
                .unwrap();
        }
        assert!(adapter.binding().is_some());

        let text =
            std::fs::read_to_string(dir.path().join("results").join("results.csv")).unwrap();
        assert_eq!(text.lines().count(), 4); // header + three trials
    }
}
