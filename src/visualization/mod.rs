//! Visualization module: SVG figures for run diagnostics.

pub mod figure;
pub mod plots;

pub use figure::{BoxStats, Figure, LineSeries};
pub use plots::{cross_validation_plot, feature_importance_bar_plot, feature_importance_boxplot};
