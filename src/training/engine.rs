//! Training job: search, fit, evaluate, persist and log one forest

use super::cross_validation::{cross_validate, CVResults};
use super::metrics::accuracy;
use super::random_forest::{ForestParams, RandomForest};
use crate::config::TrainParams;
use crate::error::Result;
use crate::explainability::{calculate_feature_importance, FeatureImportance};
use crate::inference::{save_bincode, ForestClassifierModel, ModelSignature, PredictMethod};
use crate::optimizer::{create_hyper_parameters_range, RandomizedSearch, SearchResult};
use crate::tracking::{ExperimentTracker, ModelRegistry, ModelVersion, RunStatus};
use crate::utils::data_loader::{split_features_target, Dataset};
use crate::visualization::cross_validation_plot;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// File name of the serialized forest inside the artifacts directory
pub const MODEL_FILE_NAME: &str = "rf_clf.bin";
const BANNER_WIDTH: usize = 80;

/// Outcome of a completed training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub experiment_id: String,
    pub run_id: String,
    pub forest_params: ForestParams,
    pub training_accuracy: f64,
    pub oob_score: Option<f64>,
    pub search: Option<SearchResult>,
    /// `train_<score>` / `test_<score>` across folds
    pub cv_summary: BTreeMap<String, CVResults>,
    pub feature_importance: Vec<FeatureImportance>,
    pub model_path: PathBuf,
    pub model_uri: String,
    pub registered_version: Option<ModelVersion>,
    pub training_time_secs: f64,
}

/// Runs the training job for one configuration
#[derive(Debug, Clone)]
pub struct TrainEngine {
    params: TrainParams,
    artifacts_dir: PathBuf,
}

impl TrainEngine {
    pub fn new(params: TrainParams, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            params,
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Train on `df` inside a new run of the configured experiment.
    ///
    /// The run ends `FINISHED` on success. On any error it ends `FAILED`
    /// and the error is returned.
    pub fn run(
        &self,
        df: &DataFrame,
        tracker: &ExperimentTracker,
        registry: Option<&ModelRegistry>,
    ) -> Result<TrainingReport> {
        println!("{}", "#".repeat(BANNER_WIDTH));
        println!("TRAIN STARTED\n");

        tracker.set_experiment(&self.params.experiment_name)?;
        let run = tracker.start_run(self.params.run_name.as_deref())?;

        match self.train_in_run(df, tracker, registry, &run.experiment_id, &run.run_id) {
            Ok(report) => {
                tracker.end_run(RunStatus::Finished)?;
                println!("\nTRAIN COMPLETED");
                println!("{}", "#".repeat(BANNER_WIDTH));
                Ok(report)
            }
            Err(e) => {
                warn!(run_id = %run.run_id, error = %e, "training failed");
                if let Err(end_err) = tracker.end_run(RunStatus::Failed) {
                    warn!(error = %end_err, "could not mark run as failed");
                }
                Err(e)
            }
        }
    }

    fn train_in_run(
        &self,
        df: &DataFrame,
        tracker: &ExperimentTracker,
        registry: Option<&ModelRegistry>,
        experiment_id: &str,
        run_id: &str,
    ) -> Result<TrainingReport> {
        let start = Instant::now();
        let params = &self.params;

        let Dataset {
            x,
            y,
            feature_names,
            frame,
        } = split_features_target(df, &params.target)?;
        tracker.set_tag("target", &params.target)?;
        tracker.set_tag("model_name", &params.model_name)?;
        info!(n_samples = x.nrows(), n_features = x.ncols(), "training data ready");

        let cv = params.cross_validator();

        let (forest_params, search) = if params.has_ranges() {
            let distributions = create_hyper_parameters_range(params)?;
            let search = RandomizedSearch::new(
                distributions,
                params.base_forest_params()?,
                cv.clone(),
                params.refit_scorer()?,
            )
            .with_n_iter(params.search.n_iter)
            .with_random_state(params.random_seed)
            .fit(&x, &y)?;

            let best = &search.best_params;
            tracker.log_param("best_n_estimators", best.n_estimators)?;
            tracker.log_param(
                "best_max_depth",
                best.max_depth.map_or("None".to_string(), |d| d.to_string()),
            )?;
            tracker.log_param("best_min_samples_split", best.min_samples_split)?;
            tracker.log_param("best_min_samples_leaf", best.min_samples_leaf)?;
            tracker.log_metric("search_best_score", search.best_score, 0)?;
            info!(score = search.best_score, scorer = %search.scorer, "search finished");
            (search.best_params.clone(), Some(search))
        } else {
            (params.fixed_forest_params()?, None)
        };

        let mut forest = RandomForest::new(forest_params.clone());
        forest.fit(&x, &y)?;

        fs::create_dir_all(&self.artifacts_dir)?;
        let model_path = self.artifacts_dir.join(MODEL_FILE_NAME);
        save_bincode(&forest, &model_path)?;
        println!(">>>>>>>>> model saved on {}.", model_path.display());
        tracker.log_artifact(&model_path, None)?;

        let training_accuracy = accuracy(&y, &forest.predict(&x)?);
        let oob_score = forest.oob_score_value();

        let model = ForestClassifierModel::new(forest, feature_names)?;
        let signature =
            ModelSignature::infer(&frame, &[("predict_method", PredictMethod::PredictProba.as_str())])?;
        let logged = tracker.log_model(&model, &params.model_name, &signature, Some(&frame))?;

        let registered_version = match (&params.registered_model_name, registry) {
            (Some(name), Some(registry)) => Some(registry.register(name, &logged.model_uri, Some(run_id))?),
            (Some(name), None) => {
                warn!(model = %name, "no registry available, model not registered");
                None
            }
            (None, _) => None,
        };

        let scorers = params.scorers()?;
        let cv_out = cross_validate(&RandomForest::new(forest_params.clone()), &x, &y, &cv, &scorers)?;
        let cv_summary = cv_out.summary();
        for (key, result) in &cv_summary {
            for (fold, score) in result.scores.iter().enumerate() {
                tracker.log_metric(key, *score, fold as u64)?;
            }
            tracker.log_metric(&format!("mean_{}", key), result.mean_score, 0)?;
            tracker.log_metric(&format!("std_{}", key), result.std_score, 0)?;
        }
        for scorer in &scorers {
            let figure = cross_validation_plot(cv_out.train(*scorer), cv_out.test(*scorer), scorer.name());
            tracker.log_figure(&figure, &format!("cv_{}.svg", scorer.name()))?;
        }

        let feature_importance =
            calculate_feature_importance(&model, params.feature_importance_threshold, tracker)?;

        tracker.log_params(forest_params.to_pairs())?;
        tracker.log_metric("training_accuracy", training_accuracy, 0)?;
        if let Some(oob) = oob_score {
            tracker.log_metric("oob_score", oob, 0)?;
        }

        let training_time_secs = start.elapsed().as_secs_f64();
        info!(
            run_id,
            training_accuracy,
            elapsed_secs = training_time_secs,
            "training run complete"
        );

        Ok(TrainingReport {
            experiment_id: experiment_id.to_string(),
            run_id: run_id.to_string(),
            forest_params,
            training_accuracy,
            oob_score,
            search,
            cv_summary,
            feature_importance,
            model_path,
            model_uri: logged.model_uri,
            registered_version,
            training_time_secs,
        })
    }
}

/// Train with `params`, writing the forest to `artifacts_dir`
pub fn train(
    df: &DataFrame,
    params: &TrainParams,
    tracker: &ExperimentTracker,
    registry: Option<&ModelRegistry>,
    artifacts_dir: impl Into<PathBuf>,
) -> Result<TrainingReport> {
    TrainEngine::new(params.clone(), artifacts_dir).run(df, tracker, registry)
}
