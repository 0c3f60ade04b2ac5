//! Parameter-importance evaluation over completed trials.
//!
//! Two evaluators: a one-dimensional variance-decomposition (fANOVA-style)
//! score and a mean-decrease-in-impurity score from a bootstrap forest of
//! shallow regression trees. Both operate on the leading metric of a
//! single-objective study and normalize their scores to sum to one.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hs_types::{HsResult, ParameterValue, StudyError};

use crate::storage::StudySnapshot;

const VARIANCE_EPS: f64 = 1e-12;

/// Parameter names with normalized importance scores, descending.
pub type ImportanceScores = Vec<(String, f64)>;

struct Dataset {
    names: Vec<String>,
    /// Column-major: one f64 vector per parameter.
    columns: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

fn encode(snapshot: &StudySnapshot) -> HsResult<Dataset> {
    let trials: Vec<_> = snapshot
        .trials
        .iter()
        .filter(|t| t.is_complete() && !t.values.is_empty())
        .collect();

    if trials.len() < 2 {
        return Err(StudyError::DegenerateTrials {
            message: format!(
                "need at least two completed trials, have {}",
                trials.len()
            ),
        }
        .into());
    }

    // Parameters present in every completed trial.
    let mut names: BTreeSet<String> = trials[0].parameters.keys().cloned().collect();
    for trial in &trials[1..] {
        names.retain(|name| trial.parameters.contains_key(name));
    }
    let names: Vec<String> = names.into_iter().collect();
    if names.is_empty() {
        return Err(StudyError::DegenerateTrials {
            message: "completed trials share no parameters".to_string(),
        }
        .into());
    }

    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        let mut ordinals: HashMap<String, f64> = HashMap::new();
        let column = trials
            .iter()
            .map(|trial| match &trial.parameters[name] {
                ParameterValue::Float(v) => *v,
                ParameterValue::Int(v) => *v as f64,
                ParameterValue::Json(v) => {
                    let key = v.to_string();
                    let next = ordinals.len() as f64;
                    *ordinals.entry(key).or_insert(next)
                }
            })
            .collect();
        columns.push(column);
    }

    let targets: Vec<f64> = trials.iter().map(|t| t.values[0]).collect();
    if population_variance(&targets) < VARIANCE_EPS {
        return Err(StudyError::DegenerateTrials {
            message: "objective values have zero variance".to_string(),
        }
        .into());
    }

    Ok(Dataset {
        names,
        columns,
        targets,
    })
}

fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn normalize(names: &[String], raw: Vec<f64>) -> HsResult<ImportanceScores> {
    let total: f64 = raw.iter().sum();
    if total < VARIANCE_EPS {
        return Err(StudyError::DegenerateTrials {
            message: "no parameter explains any objective variance".to_string(),
        }
        .into());
    }
    let mut scores: ImportanceScores = names
        .iter()
        .cloned()
        .zip(raw.into_iter().map(|v| v / total))
        .collect();
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scores)
}

// ---------------------------------------------------------------------------
// fANOVA-style variance decomposition
// ---------------------------------------------------------------------------

/// Main-effect variance decomposition: each parameter's score is the
/// fraction of objective variance explained by binning trials on that
/// parameter alone.
#[derive(Debug, Clone, Copy)]
pub struct FanovaEvaluator {
    pub n_bins: usize,
}

impl Default for FanovaEvaluator {
    fn default() -> Self {
        Self { n_bins: 8 }
    }
}

impl FanovaEvaluator {
    pub fn new(n_bins: usize) -> Self {
        Self {
            n_bins: n_bins.max(2),
        }
    }

    pub fn evaluate(&self, snapshot: &StudySnapshot) -> HsResult<ImportanceScores> {
        let data = encode(snapshot)?;
        let total_var = population_variance(&data.targets);
        let n = data.targets.len() as f64;
        let grand_mean = data.targets.iter().sum::<f64>() / n;

        let raw: Vec<f64> = data
            .columns
            .iter()
            .map(|column| {
                let groups = bin_column(column, self.n_bins);
                let mut between = 0.0;
                for indices in groups.values() {
                    let group_mean = indices.iter().map(|&i| data.targets[i]).sum::<f64>()
                        / indices.len() as f64;
                    between += indices.len() as f64 / n * (group_mean - grand_mean).powi(2);
                }
                between / total_var
            })
            .collect();

        normalize(&data.names, raw)
    }
}

/// Group row indices by bin. Uses the distinct values themselves when there
/// are few, equal-width bins otherwise.
fn bin_column(column: &[f64], n_bins: usize) -> HashMap<u64, Vec<usize>> {
    let distinct: BTreeSet<u64> = column.iter().map(|v| v.to_bits()).collect();
    let mut groups: HashMap<u64, Vec<usize>> = HashMap::new();

    if distinct.len() <= n_bins {
        for (i, v) in column.iter().enumerate() {
            groups.entry(v.to_bits()).or_default().push(i);
        }
        return groups;
    }

    let min = column.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = column.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / n_bins as f64;
    for (i, v) in column.iter().enumerate() {
        let bin = (((v - min) / width) as u64).min(n_bins as u64 - 1);
        groups.entry(bin).or_default().push(i);
    }
    groups
}

// ---------------------------------------------------------------------------
// Mean decrease in impurity
// ---------------------------------------------------------------------------

/// MDI importance from a bootstrap forest of shallow regression trees.
#[derive(Debug, Clone, Copy)]
pub struct MdiEvaluator {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: Option<u64>,
}

impl Default for MdiEvaluator {
    fn default() -> Self {
        Self {
            n_trees: 64,
            max_depth: 64,
            seed: None,
        }
    }
}

impl MdiEvaluator {
    pub fn new(n_trees: usize, max_depth: usize) -> Self {
        Self {
            n_trees: n_trees.max(1),
            max_depth: max_depth.max(1),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn evaluate(&self, snapshot: &StudySnapshot) -> HsResult<ImportanceScores> {
        let data = encode(snapshot)?;
        let n = data.targets.len();
        let n_features = data.columns.len();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut importances = vec![0.0; n_features];
        for _ in 0..self.n_trees {
            let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            grow_tree(&data, indices, 0, self.max_depth, &mut rng, &mut importances);
        }

        normalize(&data.names, importances)
    }
}

/// Sum of squared errors around the mean; the impurity measure.
fn sse(targets: &[f64], indices: &[usize]) -> f64 {
    let n = indices.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let sum: f64 = indices.iter().map(|&i| targets[i]).sum();
    let sum_sq: f64 = indices.iter().map(|&i| targets[i].powi(2)).sum();
    sum_sq - sum * sum / n
}

fn grow_tree(
    data: &Dataset,
    indices: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
    importances: &mut [f64],
) {
    if depth >= max_depth || indices.len() < 4 {
        return;
    }
    let parent_sse = sse(&data.targets, &indices);
    if parent_sse < VARIANCE_EPS {
        return;
    }

    // Random feature subset, sqrt of the feature count.
    let n_features = data.columns.len();
    let subset_size = ((n_features as f64).sqrt().ceil() as usize).max(1);
    let mut features: Vec<usize> = (0..n_features).collect();
    for i in 0..subset_size {
        let j = rng.gen_range(i..n_features);
        features.swap(i, j);
    }

    let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, gain)
    for &feature in &features[..subset_size] {
        if let Some((threshold, gain)) = best_split(data, &indices, feature, parent_sse) {
            if best.map(|(_, _, g)| gain > g).unwrap_or(true) {
                best = Some((feature, threshold, gain));
            }
        }
    }

    let Some((feature, threshold, gain)) = best else {
        return;
    };
    importances[feature] += gain;

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .into_iter()
        .partition(|&i| data.columns[feature][i] <= threshold);
    grow_tree(data, left, depth + 1, max_depth, rng, importances);
    grow_tree(data, right, depth + 1, max_depth, rng, importances);
}

/// Best impurity-reducing split of `indices` on `feature`, if any.
fn best_split(
    data: &Dataset,
    indices: &[usize],
    feature: usize,
    parent_sse: f64,
) -> Option<(f64, f64)> {
    let column = &data.columns[feature];
    let mut sorted: Vec<usize> = indices.to_vec();
    sorted.sort_by(|&a, &b| {
        column[a]
            .partial_cmp(&column[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let n = sorted.len() as f64;
    let total_sum: f64 = sorted.iter().map(|&i| data.targets[i]).sum();
    let total_sq: f64 = sorted.iter().map(|&i| data.targets[i].powi(2)).sum();

    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for (pos, &i) in sorted.iter().enumerate().take(sorted.len() - 1) {
        let y = data.targets[i];
        left_sum += y;
        left_sq += y.powi(2);

        let here = column[i];
        let next = column[sorted[pos + 1]];
        if next <= here {
            continue;
        }

        let left_n = (pos + 1) as f64;
        let right_n = n - left_n;
        let left_sse = left_sq - left_sum * left_sum / left_n;
        let right_sum = total_sum - left_sum;
        let right_sse = (total_sq - left_sq) - right_sum * right_sum / right_n;

        let gain = parent_sse - left_sse - right_sse;
        if gain > VARIANCE_EPS && best.map(|(_, g)| gain > g).unwrap_or(true) {
            best = Some(((here + next) / 2.0, gain));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::Trial;
    use hs_types::Direction;
    use std::collections::HashMap as StdHashMap;
    use uuid::Uuid;

    /// Trials where the objective is driven by `x` and ignores `noise`.
    fn driven_snapshot(n: usize) -> StudySnapshot {
        let trials = (0..n)
            .map(|i| {
                let x = i as f64 / n as f64;
                let noise = ((i * 7919) % 13) as f64 / 13.0;
                let mut params = StdHashMap::new();
                params.insert("x".to_string(), ParameterValue::Float(x));
                params.insert("noise".to_string(), ParameterValue::Float(noise));
                let mut trial = Trial::new(i, params);
                trial.mark_running(None);
                trial.mark_completed(vec![10.0 * x * x]);
                trial
            })
            .collect();

        StudySnapshot {
            id: Uuid::new_v4(),
            name: "importance".to_string(),
            directions: vec![Direction::Minimize],
            metrics: vec!["loss".to_string()],
            trials,
        }
    }

    #[test]
    fn fanova_ranks_driving_parameter_first() {
        let scores = FanovaEvaluator::default()
            .evaluate(&driven_snapshot(64))
            .unwrap();
        assert_eq!(scores[0].0, "x");
        assert!(scores[0].1 > scores[1].1);
        let total: f64 = scores.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mdi_ranks_driving_parameter_first() {
        let scores = MdiEvaluator::new(32, 8)
            .with_seed(9)
            .evaluate(&driven_snapshot(64))
            .unwrap();
        assert_eq!(scores[0].0, "x");
        assert!(scores[0].1 > 0.5);
    }

    #[test]
    fn too_few_trials_is_degenerate() {
        let err = FanovaEvaluator::default()
            .evaluate(&driven_snapshot(1))
            .unwrap_err();
        assert!(err.to_string().contains("two completed trials"));
    }

    #[test]
    fn zero_variance_objective_is_degenerate() {
        let mut snapshot = driven_snapshot(10);
        for trial in &mut snapshot.trials {
            trial.values = vec![1.0];
        }
        assert!(MdiEvaluator::new(8, 4).evaluate(&snapshot).is_err());
        assert!(FanovaEvaluator::default().evaluate(&snapshot).is_err());
    }

    #[test]
    fn categorical_parameters_are_encoded() {
        let mut snapshot = driven_snapshot(20);
        for (i, trial) in snapshot.trials.iter_mut().enumerate() {
            let kind = if i % 2 == 0 { "adam" } else { "sgd" };
            trial.parameters.insert(
                "optimizer".to_string(),
                ParameterValue::Json(serde_json::json!(kind)),
            );
        }
        let scores = FanovaEvaluator::default().evaluate(&snapshot).unwrap();
        assert_eq!(scores.len(), 3);
    }
}
