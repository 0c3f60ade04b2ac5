//! # hs-objective
//!
//! The objective adapter layer: a capability trait for user-supplied
//! training routines, configuration injection through the path updater,
//! metric-contract validation, and the per-worker CSV trial ledger.

pub mod device;
pub mod ledger;
pub mod objective;

pub use device::{devices_from_gpu, Device};
pub use ledger::TrialLedger;
pub use objective::{Objective, ObjectiveAdapter, WorkerBinding};
