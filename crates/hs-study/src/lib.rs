//! # hs-study
//!
//! The optimization-library layer of Hypersweep: search-space definitions,
//! sweep strategies (random, grid, Bayesian), trial tracking with a per-trial
//! suggestion context, pruning, local study storage, the study facade, and
//! parameter-importance evaluators.

pub mod importance;
pub mod pruner;
pub mod search;
pub mod storage;
pub mod study;
pub mod trial;

pub use importance::{FanovaEvaluator, ImportanceScores, MdiEvaluator};
pub use pruner::{pruner_from_config, MedianPruner, NopPruner, Pruner, TrialHistory};
pub use search::{
    strategy_from_config, BayesianSearch, GridSearch, ParameterDef, ParameterKind, RandomSearch,
    SearchSpace, SearchStrategy,
};
pub use storage::{StudySnapshot, StudyStorage};
pub use study::{ObjectiveFn, Study, StudyOptions};
pub use trial::{Trial, TrialContext, TrialStatus};
