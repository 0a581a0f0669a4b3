//! Integration test: hyperparameter ranges from configuration files

use forest_train::optimizer::create_hyper_parameters_range;
use forest_train::tracking::{ExperimentTracker, RunStatus};
use forest_train::training::MinSamplesSplit;
use forest_train::{load_json, train, ForestError};
use polars::prelude::*;
use std::fs;

fn params_from(json: serde_json::Value) -> forest_train::Result<forest_train::TrainParams> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, json.to_string()).unwrap();
    load_json(&path)
}

#[test]
fn test_ranges_from_config() {
    let params = params_from(serde_json::json!({
        "target": "y",
        "model_name": "m",
        "model_parameters": {
            "n_estimators": [10, 30],
            "max_depth": [3, 6],
            "min_samples_split": [0.2, 0.5],
            "min_samples_leaf": 2
        }
    }))
    .unwrap();

    let ranges = create_hyper_parameters_range(&params).unwrap();
    assert_eq!(ranges.n_estimators, vec![10.0, 15.0, 20.0, 25.0]);
    assert_eq!(ranges.max_depth, Some(vec![3.0, 4.0, 5.0]));
    assert_eq!(ranges.min_samples_split.len(), 3);
    assert!((ranges.min_samples_split[2] - 0.4).abs() < 1e-9);
    assert_eq!(ranges.min_samples_leaf, vec![2.0]);
    assert_eq!(ranges.grid_size(), 4 * 3 * 3);
}

#[test]
fn test_unbounded_depth_is_not_searched() {
    let params = params_from(serde_json::json!({
        "target": "y",
        "model_name": "m",
        "model_parameters": { "n_estimators": [5, 20] }
    }))
    .unwrap();

    let ranges = create_hyper_parameters_range(&params).unwrap();
    assert!(ranges.max_depth.is_none());
    let names: Vec<&str> = ranges.entries().iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["n_estimators", "min_samples_split", "min_samples_leaf"]);
}

#[test]
fn test_empty_range_is_config_error() {
    let params = params_from(serde_json::json!({
        "target": "y",
        "model_name": "m",
        "model_parameters": { "n_estimators": [20, 10] }
    }));

    let err = params.and_then(|p| create_hyper_parameters_range(&p)).unwrap_err();
    assert!(matches!(err, ForestError::ConfigError(_)));
}

#[test]
fn test_count_split_range_searches_whole_counts() {
    let params = params_from(serde_json::json!({
        "target": "label",
        "model_name": "m",
        "random_seed": 1,
        "model_parameters": { "n_estimators": 5, "min_samples_split": [2, 4] },
        "cross_validation": { "n_splits": 2, "scoring": ["accuracy"] },
        "search": { "n_iter": 30 }
    }))
    .unwrap();

    // step 0.1 over [2, 4) mixes whole counts with invalid fractional ones
    let ranges = create_hyper_parameters_range(&params).unwrap();
    assert_eq!(ranges.min_samples_split.len(), 20);

    let n = 40;
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let noise: Vec<f64> = (0..n).map(|i| ((i * 7) % 5) as f64).collect();
    let label: Vec<i64> = (0..n).map(|i| i64::from(i >= n / 2)).collect();
    let df = df! { "x" => x, "noise" => noise, "label" => label }.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let tracker = ExperimentTracker::local(dir.path().join("mlruns")).unwrap();
    let report = train(&df, &params, &tracker, None, dir.path().join("artifacts")).unwrap();

    let search = report.search.as_ref().unwrap();
    assert_eq!(search.trials.len(), 20);
    assert_eq!(search.trials.iter().filter(|t| !t.is_failed()).count(), 2);
    assert!(matches!(
        report.forest_params.min_samples_split,
        MinSamplesSplit::Count(2) | MinSamplesSplit::Count(3)
    ));

    let run = tracker.get_run(&report.experiment_id, &report.run_id).unwrap();
    assert_eq!(run.info.status, RunStatus::Finished);
}
