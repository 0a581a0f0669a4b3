//! forest-train - Random forest training with experiment tracking
//!
//! This crate trains a random forest classifier from a CSV file and a JSON
//! run configuration, logging everything it does to a local tracking store:
//! - Configuration parsing and validation
//! - Hyperparameter range construction and randomized search
//! - Forest fitting, cross-validation and feature importance
//! - Logged models with signatures and selectable prediction methods
//!
//! # Modules
//!
//! ## Core ML Modules
//! - [`training`] - Decision trees, random forest, metrics, cross-validation
//! - [`optimizer`] - Hyperparameter ranges and randomized search
//! - [`inference`] - Model wrapper, prediction methods, signatures
//! - [`explainability`] - Impurity-based feature importance
//!
//! ## Infrastructure
//! - [`tracking`] - Experiments, runs, metrics, artifacts, model registry
//! - [`visualization`] - SVG figures for logged plots
//! - [`utils`] - CSV loading and feature/target split
//!
//! ## Services
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Core ML modules
pub mod training;
pub mod optimizer;
pub mod inference;
pub mod explainability;

// Infrastructure
pub mod tracking;
pub mod visualization;
pub mod utils;

// Services
pub mod cli;

pub use config::{load_json, TrainParams};
pub use error::{ForestError, Result};
pub use inference::{ForestClassifierModel, LoggedModel, PredictMethod, PredictParams};
pub use optimizer::{create_hyper_parameters_range, RandomizedSearch};
pub use tracking::{ExperimentTracker, ModelRegistry};
pub use training::{train, ForestParams, RandomForest, TrainEngine, TrainingReport};
pub use utils::{load_csv, Dataset};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
