//! Experiment tracking
//!
//! Local file store for experiments, runs, metrics and artifacts, plus a
//! registry of named model versions.

mod registry;
mod run;
mod storage;
mod tracker;

pub use registry::{ModelRegistry, ModelVersion, MODELS_DIR};
pub use run::{Experiment, Metric, Run, RunInfo, RunStatus};
pub use storage::{LocalStorage, StorageBackend, ARTIFACTS_DIR};
pub use tracker::{ExperimentTracker, ModelInfo, DEFAULT_EXPERIMENT};
