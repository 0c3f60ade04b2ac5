//! # hs-config
//!
//! Configuration layer for Hypersweep: typed loading of the hyperparameter
//! document, raw loading of the model document, the colon-path updater that
//! maps declared parameter names onto arbitrary nesting depth, and cluster
//! wall-time extraction.

pub mod loader;
pub mod tree;
pub mod walltime;

pub use loader::{
    config_check, load_hyper_config, load_model_config, HyperConfig, PbsBatch, PbsSection,
    PrunerConfig, SamplerConfig, SlurmBatch, SlurmSection, StorageConfig, StudySection,
};
pub use tree::{flatten, split_path, unmatched_parameters, update_colon_path, update_path, Leaves};
pub use walltime::{parse_wall_time, wall_time_from_sections, DEFAULT_WALL_TIME_SECS};
