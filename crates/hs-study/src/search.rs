//! Search space definitions and parameter sweep strategies.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use hs_config::SamplerConfig;
use hs_types::{ConfigError, HsResult, ParameterValue, SuggestionKind, SuggestionSpec};

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Declared parameter name, colon path included (e.g. "model:dropout").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Build the space from the declarative `parameters:` section.
    ///
    /// An unrecognized or malformed spec fails here, before any trial is
    /// dispatched.
    pub fn from_specs(specs: &BTreeMap<String, SuggestionSpec>) -> HsResult<Self> {
        let mut space = Self::new();
        for (name, spec) in specs {
            spec.validate(name)?;
            let kind = match spec.resolve_kind(name)? {
                SuggestionKind::Float => ParameterKind::FloatRange {
                    low: spec.low.unwrap_or(0.0),
                    high: spec.high.unwrap_or(0.0),
                },
                SuggestionKind::LogUniform => ParameterKind::LogUniform {
                    low: spec.low.unwrap_or(f64::MIN_POSITIVE),
                    high: spec.high.unwrap_or(1.0),
                },
                SuggestionKind::Int => ParameterKind::IntRange {
                    low: spec.low.unwrap_or(0.0) as i64,
                    high: spec.high.unwrap_or(0.0) as i64,
                },
                SuggestionKind::Categorical => ParameterKind::Choice {
                    values: spec.choices.clone(),
                },
            };
            space.parameters.push(ParameterDef {
                name: name.clone(),
                kind,
            });
        }
        Ok(space)
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    /// Total number of grid points (returns `None` if any parameter is
    /// continuous without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::IntRange { low, high } => (high - low + 1) as usize,
                ParameterKind::Choice { values } => values.len(),
                // Continuous dimensions need explicit step count.
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Generate the next batch of parameter assignments to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<HashMap<String, ParameterValue>>;

    /// Report completed trial results so adaptive strategies can learn.
    fn report(&mut self, _params: &HashMap<String, ParameterValue>, _objective: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn sample_kind(rng: &mut StdRng, kind: &ParameterKind) -> ParameterValue {
    match kind {
        ParameterKind::FloatRange { low, high } => {
            ParameterValue::Float(rng.gen_range(*low..=*high))
        }
        ParameterKind::IntRange { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
        ParameterKind::LogUniform { low, high } => {
            let log_val: f64 = rng.gen_range(low.ln()..=high.ln());
            ParameterValue::Float(log_val.exp())
        }
        ParameterKind::Choice { values } => {
            let idx = rng.gen_range(0..values.len());
            ParameterValue::Json(values[idx].clone())
        }
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: Option<u64>) -> Self {
        Self {
            space,
            rng: rng_from_seed(seed),
        }
    }

    fn sample_one(&mut self) -> HashMap<String, ParameterValue> {
        let mut params = HashMap::new();
        for param in &self.space.parameters {
            params.insert(param.name.clone(), sample_kind(&mut self.rng, &param.kind));
        }
        params
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<HashMap<String, ParameterValue>> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Grid search ----

/// Exhaustive grid search over discrete parameter combinations.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    combos: Vec<HashMap<String, ParameterValue>>,
}

impl GridSearch {
    pub fn new(space: SearchSpace, float_steps: usize) -> Self {
        let combos = Self::build_grid(&space, float_steps);
        Self { cursor: 0, combos }
    }

    fn build_grid(space: &SearchSpace, float_steps: usize) -> Vec<HashMap<String, ParameterValue>> {
        let mut axes: Vec<Vec<(&str, ParameterValue)>> = Vec::new();

        for param in &space.parameters {
            let values: Vec<ParameterValue> = match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    let steps = float_steps.max(2);
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParameterValue::Float(low + t * (high - low))
                        })
                        .collect()
                }
                ParameterKind::IntRange { low, high } => {
                    (*low..=*high).map(ParameterValue::Int).collect()
                }
                ParameterKind::LogUniform { low, high } => {
                    let steps = float_steps.max(2);
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParameterValue::Float((log_low + t * (log_high - log_low)).exp())
                        })
                        .collect()
                }
                ParameterKind::Choice { values } => values
                    .iter()
                    .map(|v| ParameterValue::Json(v.clone()))
                    .collect(),
            };
            axes.push(
                values
                    .into_iter()
                    .map(|v| (param.name.as_str(), v))
                    .collect(),
            );
        }

        // Cartesian product
        let mut result: Vec<HashMap<String, ParameterValue>> = vec![HashMap::new()];
        for axis in &axes {
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for (name, value) in axis {
                    let mut combo = existing.clone();
                    combo.insert(name.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }

        result
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<HashMap<String, ParameterValue>> {
        let end = (self.cursor + count).min(self.combos.len());
        let batch = self.combos[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Bayesian search (surrogate-model heuristic) ----

/// Bayesian-style optimization using an explore/exploit heuristic.
///
/// Tracks observed (params, objective) pairs; exploitation perturbs the
/// best-known point, exploration falls back to uniform sampling.
#[derive(Debug)]
pub struct BayesianSearch {
    space: SearchSpace,
    observations: Vec<(HashMap<String, ParameterValue>, f64)>,
    exploration_weight: f64,
    rng: StdRng,
}

impl BayesianSearch {
    pub fn new(space: SearchSpace, exploration_weight: f64, seed: Option<u64>) -> Self {
        Self {
            space,
            observations: Vec::new(),
            exploration_weight,
            rng: rng_from_seed(seed),
        }
    }

    /// Pure exploration sample.
    fn explore(&mut self) -> HashMap<String, ParameterValue> {
        let mut params = HashMap::new();
        for param in &self.space.parameters {
            params.insert(param.name.clone(), sample_kind(&mut self.rng, &param.kind));
        }
        params
    }

    /// Exploitation: perturb the best-known point.
    fn exploit(&mut self) -> HashMap<String, ParameterValue> {
        let best = self
            .observations
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let base = match best {
            Some((params, _)) => params.clone(),
            None => return self.explore(),
        };

        let mut perturbed = HashMap::new();
        // Clone so sampling can borrow the rng without fighting the space.
        let parameters = self.space.parameters.clone();
        for param in &parameters {
            let base_val = base.get(&param.name);
            let value = match (&param.kind, base_val) {
                (ParameterKind::FloatRange { low, high }, Some(ParameterValue::Float(v))) => {
                    let range = high - low;
                    let noise = self.rng.gen_range(-0.1..0.1) * range;
                    ParameterValue::Float((v + noise).clamp(*low, *high))
                }
                (ParameterKind::IntRange { low, high }, Some(ParameterValue::Int(v))) => {
                    let delta: i64 = self.rng.gen_range(-2..=2);
                    ParameterValue::Int((v + delta).clamp(*low, *high))
                }
                (ParameterKind::LogUniform { low, high }, Some(ParameterValue::Float(v))) => {
                    let log_range = high.ln() - low.ln();
                    let noise = self.rng.gen_range(-0.1..0.1) * log_range;
                    ParameterValue::Float((v.ln() + noise).exp().clamp(*low, *high))
                }
                // Choices and missing bases resample uniformly.
                _ => sample_kind(&mut self.rng, &param.kind),
            };
            perturbed.insert(param.name.clone(), value);
        }

        perturbed
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<HashMap<String, ParameterValue>> {
        (0..count)
            .map(|_| {
                if self.observations.is_empty() || self.rng.gen::<f64>() < self.exploration_weight {
                    self.explore()
                } else {
                    self.exploit()
                }
            })
            .collect()
    }

    fn report(&mut self, params: &HashMap<String, ParameterValue>, objective: f64) {
        self.observations.push((params.clone(), objective));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

/// Build the strategy named by the sampler descriptor.
pub fn strategy_from_config(
    space: SearchSpace,
    config: &SamplerConfig,
) -> HsResult<Box<dyn SearchStrategy>> {
    let strategy: Box<dyn SearchStrategy> = match config.kind.as_str() {
        "random" => Box::new(RandomSearch::new(space, config.seed)),
        "grid" => Box::new(GridSearch::new(space, config.grid_steps)),
        "bayesian" => Box::new(BayesianSearch::new(
            space,
            config.exploration_weight,
            config.seed,
        )),
        other => {
            return Err(ConfigError::UnknownSampler {
                kind: other.to_string(),
            }
            .into())
        }
    };
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::SuggestionSpec;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_int("layers", 1, 4)
            .add_float("dropout", 0.0, 0.5)
            .add_log_uniform("lr", 1e-5, 1e-1)
    }

    #[test]
    fn from_specs_builds_all_kinds() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "model:dropout".to_string(),
            SuggestionSpec {
                kind: "float".to_string(),
                low: Some(0.0),
                high: Some(0.5),
                choices: Vec::new(),
                log: false,
            },
        );
        specs.insert(
            "model:activation".to_string(),
            SuggestionSpec {
                kind: "choice".to_string(),
                low: None,
                high: None,
                choices: vec![serde_json::json!("relu"), serde_json::json!("tanh")],
                log: false,
            },
        );

        let space = SearchSpace::from_specs(&specs).unwrap();
        assert_eq!(space.parameters.len(), 2);
    }

    #[test]
    fn from_specs_rejects_bogus_type() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "model:dropout".to_string(),
            SuggestionSpec {
                kind: "bogus".to_string(),
                low: Some(0.0),
                high: Some(0.5),
                choices: Vec::new(),
                log: false,
            },
        );
        let err = SearchSpace::from_specs(&specs).unwrap_err();
        assert!(err.to_string().contains("model:dropout"));
    }

    #[test]
    fn random_search_respects_bounds() {
        let mut rs = RandomSearch::new(sample_space(), Some(7));
        let suggestions = rs.suggest(50);
        assert_eq!(suggestions.len(), 50);

        for params in &suggestions {
            match params.get("layers") {
                Some(ParameterValue::Int(v)) => assert!(*v >= 1 && *v <= 4),
                other => panic!("unexpected layers value: {other:?}"),
            }
            match params.get("lr") {
                Some(ParameterValue::Float(v)) => assert!(*v >= 1e-5 && *v <= 1e-1),
                other => panic!("unexpected lr value: {other:?}"),
            }
        }
    }

    #[test]
    fn seeded_random_search_is_reproducible() {
        let a = RandomSearch::new(sample_space(), Some(42)).suggest(5);
        let b = RandomSearch::new(sample_space(), Some(42)).suggest(5);
        assert_eq!(a, b);
    }

    #[test]
    fn grid_search_produces_correct_count() {
        let space = SearchSpace::new().add_int("a", 1, 3).add_int("b", 10, 11);
        assert_eq!(space.grid_size(), Some(6));

        let mut gs = GridSearch::new(space, 5);
        let batch = gs.suggest(100);
        assert_eq!(batch.len(), 6);
    }

    #[test]
    fn grid_search_cursor_advances() {
        let space = SearchSpace::new().add_int("x", 1, 5);
        let mut gs = GridSearch::new(space, 5);
        assert_eq!(gs.suggest(3).len(), 3);
        assert_eq!(gs.suggest(10).len(), 2); // only 2 remain
    }

    #[test]
    fn grid_size_none_for_float_only() {
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        assert_eq!(space.grid_size(), None);
    }

    #[test]
    fn bayesian_search_exploits_after_reports() {
        let space = SearchSpace::new().add_float("lr", 0.001, 1.0);
        let mut bs = BayesianSearch::new(space, 0.0, Some(3));

        let mut best = HashMap::new();
        best.insert("lr".to_string(), ParameterValue::Float(0.01));
        bs.report(&best, 0.95);

        for params in bs.suggest(20) {
            match params.get("lr") {
                Some(ParameterValue::Float(v)) => assert!(*v >= 0.001 && *v <= 1.0),
                other => panic!("unexpected lr value: {other:?}"),
            }
        }
    }

    #[test]
    fn factory_rejects_unknown_kind() {
        let config = SamplerConfig {
            kind: "annealing".to_string(),
            ..SamplerConfig::default()
        };
        assert!(strategy_from_config(sample_space(), &config).is_err());
    }

    #[test]
    fn factory_builds_each_known_kind() {
        for kind in ["random", "grid", "bayesian"] {
            let config = SamplerConfig {
                kind: kind.to_string(),
                ..SamplerConfig::default()
            };
            let strategy = strategy_from_config(sample_space(), &config).unwrap();
            assert_eq!(strategy.name(), kind);
        }
    }
}
