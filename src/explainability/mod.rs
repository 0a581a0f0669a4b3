//! Model explainability module
//!
//! Impurity-based feature importance tables and their logged figures.

mod feature_importance;

pub use feature_importance::{
    calculate_feature_importance, feature_importance_table, importance_csv, FeatureImportance,
    BAR_PLOT_ARTIFACT, BOXPLOT_ARTIFACT, TABLE_ARTIFACT,
};
