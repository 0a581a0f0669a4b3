//! Diagnostic plots logged by the training job

use super::figure::{Figure, LineSeries};

/// Distribution of all feature importances as one horizontal box
pub fn feature_importance_boxplot(importances: &[f64]) -> Figure {
    Figure::new(800.0, 400.0)
        .with_title("Feature importance distribution")
        .with_x_label("Importance")
        .horizontal_box(importances, "#1f77b4")
}

/// Horizontal bars for `(feature, importance)` rows already filtered to
/// importances above `threshold`, drawn in the given order from the bottom up
pub fn feature_importance_bar_plot(rows: &[(String, f64)], threshold: f64) -> Figure {
    let labels = rows.iter().map(|(name, _)| name.clone()).collect();
    let values = rows.iter().map(|(_, v)| *v).collect();
    Figure::new(800.0, 1000.0)
        .with_title(format!("{} importance greater than {}", rows.len(), threshold))
        .with_x_label("Importance")
        .with_y_label("Features")
        .horizontal_bars(labels, values, "#1f77b4")
}

/// Per-fold train (blue) and validation (red) scores for one scorer
pub fn cross_validation_plot(train: &[f64], test: &[f64], score: &str) -> Figure {
    let folds = |n: usize| (1..=n).map(|i| i as f64).collect::<Vec<f64>>();
    Figure::new(800.0, 400.0)
        .with_title(format!("Cross-validation {} score", score))
        .with_x_label("Iteration")
        .with_y_label("Score")
        .with_x_ticks(folds(train.len()))
        .with_grid(true)
        .with_legend(true)
        .line(
            LineSeries::new("Train", folds(train.len()), train.to_vec())
                .with_color("blue")
                .with_markers(true),
        )
        .line(
            LineSeries::new("Validation", folds(test.len()), test.to_vec())
                .with_color("red")
                .with_markers(true),
        )
}
