//! Hyperparameter search
//!
//! - Range construction from the configured model parameters
//! - Randomized search scored by cross-validation

mod search;
mod search_space;

pub use search::{RandomizedSearch, SearchResult, TrialResult};
pub use search_space::{
    arange, create_hyper_parameters_range, Candidate, ParamDistributions, MAX_DEPTH_STEP,
    MIN_SAMPLES_LEAF_STEP, MIN_SAMPLES_SPLIT_STEP, N_ESTIMATORS_STEP,
};
