//! # hs-cli
//!
//! Shared pieces of the two Hypersweep binaries: logging bootstrap and the
//! built-in benchmark objectives.

pub mod logging;
pub mod objectives;

pub use logging::init_logging;
pub use objectives::{resolve_objective, RosenbrockObjective, SphereObjective};
