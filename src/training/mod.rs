//! Model training module
//!
//! Provides the random forest classifier and everything around fitting it:
//! - CART decision trees and the bagged forest built from them
//! - Classification scorers
//! - Stratified and plain K-fold cross-validation
//! - The end-to-end training job ([`TrainEngine`])

mod engine;
pub mod cross_validation;
pub mod decision_tree;
pub mod metrics;
pub mod random_forest;

pub use cross_validation::{cross_validate, CVResults, CVSplit, CVStrategy, CrossValidateOutput, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use engine::{train, TrainEngine, TrainingReport, MODEL_FILE_NAME};
pub use metrics::Scorer;
pub use random_forest::{ForestParams, MaxFeatures, MinSamplesSplit, RandomForest};
