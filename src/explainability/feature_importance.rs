//! Impurity-based feature importance reporting

use crate::error::{ForestError, Result};
use crate::inference::ForestClassifierModel;
use crate::tracking::ExperimentTracker;
use crate::visualization::{feature_importance_bar_plot, feature_importance_boxplot};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const BOXPLOT_ARTIFACT: &str = "feature_importance_boxplot.svg";
pub const BAR_PLOT_ARTIFACT: &str = "feature_importance_bar_plot.svg";
pub const TABLE_ARTIFACT: &str = "feature_importance.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// `(feature, importance)` for every feature, ascending by importance
pub fn feature_importance_table(model: &ForestClassifierModel) -> Result<Vec<FeatureImportance>> {
    let importances = model
        .forest()
        .feature_importances()
        .ok_or(ForestError::ModelNotFitted)?;
    let mut rows: Vec<FeatureImportance> = model
        .feature_names()
        .iter()
        .zip(importances.iter())
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.clone(),
            importance: *importance,
        })
        .collect();
    rows.sort_by(|a, b| a.importance.total_cmp(&b.importance));
    Ok(rows)
}

/// Rows as CSV with a `feature,importance` header
pub fn importance_csv(rows: &[FeatureImportance]) -> Result<String> {
    let mut df = df! {
        "feature" => rows.iter().map(|r| r.feature.as_str()).collect::<Vec<_>>(),
        "importance" => rows.iter().map(|r| r.importance).collect::<Vec<f64>>(),
    }?;
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(&mut df)?;
    String::from_utf8(buf).map_err(|e| ForestError::SerializationError(e.to_string()))
}

/// Log the importance box plot, the bar plot of features above `threshold`
/// and that filtered table to the active run; return the filtered rows
/// in ascending order.
pub fn calculate_feature_importance(
    model: &ForestClassifierModel,
    threshold: f64,
    tracker: &ExperimentTracker,
) -> Result<Vec<FeatureImportance>> {
    let table = feature_importance_table(model)?;
    let all: Vec<f64> = table.iter().map(|r| r.importance).collect();
    tracker.log_figure(&feature_importance_boxplot(&all), BOXPLOT_ARTIFACT)?;

    let kept: Vec<FeatureImportance> = table.into_iter().filter(|r| r.importance > threshold).collect();
    let pairs: Vec<(String, f64)> = kept.iter().map(|r| (r.feature.clone(), r.importance)).collect();
    tracker.log_figure(&feature_importance_bar_plot(&pairs, threshold), BAR_PLOT_ARTIFACT)?;
    tracker.log_text(&importance_csv(&kept)?, TABLE_ARTIFACT)?;

    info!(
        n_features = all.len(),
        n_kept = kept.len(),
        threshold,
        "feature importance logged"
    );
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::random_forest::{ForestParams, RandomForest};
    use ndarray::{array, Array2};

    fn model() -> ForestClassifierModel {
        // feature 0 separates the classes, feature 1 is constant
        let x: Array2<f64> = array![[0.0, 5.0], [0.1, 5.0], [0.2, 5.0], [1.0, 5.0], [1.1, 5.0], [1.2, 5.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut forest = RandomForest::new(ForestParams {
            n_estimators: 5,
            bootstrap: false,
            random_state: Some(1),
            ..ForestParams::default()
        });
        forest.fit(&x, &y).unwrap();
        ForestClassifierModel::new(forest, vec!["signal".into(), "flat".into()]).unwrap()
    }

    #[test]
    fn test_table_sorted_ascending() {
        let table = feature_importance_table(&model()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].feature, "flat");
        assert_eq!(table[0].importance, 0.0);
        assert_eq!(table[1].feature, "signal");
        assert!((table[1].importance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_header() {
        let rows = vec![FeatureImportance {
            feature: "a".into(),
            importance: 0.5,
        }];
        let csv = importance_csv(&rows).unwrap();
        assert!(csv.starts_with("feature,importance\n"));
        assert!(csv.contains("a,0.5"));
    }

    #[test]
    fn test_calculate_logs_artifacts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::local(dir.path()).unwrap();
        tracker.start_run(None).unwrap();

        let kept = calculate_feature_importance(&model(), 0.0, &tracker).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].feature, "signal");

        let artifacts = tracker.artifact_dir().unwrap();
        assert!(artifacts.join(BOXPLOT_ARTIFACT).is_file());
        let bar = std::fs::read_to_string(artifacts.join(BAR_PLOT_ARTIFACT)).unwrap();
        assert!(bar.contains("1 importance greater than 0"));
        assert!(artifacts.join(TABLE_ARTIFACT).is_file());
    }
}
