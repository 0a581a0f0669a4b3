//! Multi-mode prediction wrapper and model persistence

use super::config::{PredictMethod, PredictParams};
use super::signature::{input_example, ModelSignature};
use crate::error::{ForestError, Result};
use crate::training::random_forest::RandomForest;
use crate::utils::data_loader::columns_to_array2;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MLMODEL_FILE: &str = "MLmodel.json";
pub const MODEL_DATA_FILE: &str = "model.bin";
pub const INPUT_EXAMPLE_FILE: &str = "input_example.json";
pub const FLAVOR: &str = "forest_train.random_forest";

/// Result of a prediction call, shaped by the method used
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutput {
    Labels(Array1<f64>),
    Probabilities(Array2<f64>),
    LogProbabilities(Array2<f64>),
}

impl PredictionOutput {
    pub fn n_rows(&self) -> usize {
        match self {
            PredictionOutput::Labels(labels) => labels.len(),
            PredictionOutput::Probabilities(p) | PredictionOutput::LogProbabilities(p) => p.nrows(),
        }
    }

    /// Tabular form: a `prediction` column for labels, otherwise one
    /// `proba_<class>` / `log_proba_<class>` column per class
    pub fn to_dataframe(&self, classes: &[f64]) -> Result<DataFrame> {
        let columns: Vec<Column> = match self {
            PredictionOutput::Labels(labels) => {
                vec![Series::new("prediction".into(), labels.to_vec()).into()]
            }
            PredictionOutput::Probabilities(p) => matrix_columns(p, classes, "proba")?,
            PredictionOutput::LogProbabilities(p) => matrix_columns(p, classes, "log_proba")?,
        };
        Ok(DataFrame::new(columns)?)
    }
}

fn matrix_columns(matrix: &Array2<f64>, classes: &[f64], prefix: &str) -> Result<Vec<Column>> {
    if matrix.ncols() != classes.len() {
        return Err(ForestError::ShapeError {
            expected: format!("{} class columns", classes.len()),
            actual: format!("{} columns", matrix.ncols()),
        });
    }
    Ok(classes
        .iter()
        .enumerate()
        .map(|(j, class)| {
            Series::new(format!("{}_{}", prefix, class).into(), matrix.column(j).to_vec()).into()
        })
        .collect())
}

/// A fitted forest bound to its feature columns, answering `predict`,
/// `predict_proba` or `predict_log_proba` on request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestClassifierModel {
    forest: RandomForest,
    feature_names: Vec<String>,
    /// Method used when a call names none
    default_method: PredictMethod,
}

impl ForestClassifierModel {
    pub fn new(forest: RandomForest, feature_names: Vec<String>) -> Result<Self> {
        if !forest.is_fitted() {
            return Err(ForestError::ModelNotFitted);
        }
        if forest.n_features() != feature_names.len() {
            return Err(ForestError::ShapeError {
                expected: format!("{} feature names", forest.n_features()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        Ok(Self {
            forest,
            feature_names,
            default_method: PredictMethod::default(),
        })
    }

    pub fn with_default_method(mut self, method: PredictMethod) -> Self {
        self.default_method = method;
        self
    }

    /// Run the requested prediction method over the feature columns of `input`
    pub fn predict(&self, input: &DataFrame, params: Option<&PredictParams>) -> Result<PredictionOutput> {
        let method = match params {
            Some(p) => p.resolve(self.default_method)?,
            None => self.default_method,
        };
        let x = columns_to_array2(input, &self.feature_names)?;
        debug!(rows = x.nrows(), method = %method, "predicting");
        self.predict_array(&x, method)
    }

    pub fn predict_array(&self, x: &Array2<f64>, method: PredictMethod) -> Result<PredictionOutput> {
        Ok(match method {
            PredictMethod::Predict => PredictionOutput::Labels(self.forest.predict(x)?),
            PredictMethod::PredictProba => PredictionOutput::Probabilities(self.forest.predict_proba(x)?),
            PredictMethod::PredictLogProba => {
                PredictionOutput::LogProbabilities(self.forest.predict_log_proba(x)?)
            }
        })
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn classes(&self) -> &[f64] {
        self.forest.classes()
    }

    pub fn default_method(&self) -> PredictMethod {
        self.default_method
    }
}

/// Write `value` to `path` in bincode
pub fn save_bincode<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), value)?;
    Ok(())
}

/// Read a bincode value written by [`save_bincode`]
pub fn load_bincode<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ForestError::SerializationError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}

/// Contents of `MLmodel.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub artifact_path: String,
    pub run_id: Option<String>,
    pub flavor: String,
    pub model_file: String,
    pub created_at: DateTime<Utc>,
    pub crate_version: String,
    pub classes: Vec<f64>,
    pub signature: ModelSignature,
    pub input_example: Option<String>,
}

/// A model directory as written by [`LoggedModel::write`]
#[derive(Debug, Clone)]
pub struct LoggedModel {
    pub metadata: ModelMetadata,
    pub model: ForestClassifierModel,
}

impl LoggedModel {
    /// Write `MLmodel.json`, `model.bin` and, when a sample frame is given,
    /// `input_example.json` into `dir`.
    ///
    /// The model's default method is taken from the signature's
    /// `predict_method` parameter.
    pub fn write(
        dir: impl AsRef<Path>,
        model: &ForestClassifierModel,
        signature: &ModelSignature,
        artifact_path: &str,
        run_id: Option<&str>,
        example: Option<&DataFrame>,
    ) -> Result<ModelMetadata> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let model = match signature.param_default("predict_method") {
            Some(name) => model.clone().with_default_method(name.parse()?),
            None => model.clone(),
        };
        save_bincode(&model, dir.join(MODEL_DATA_FILE))?;

        let input_example_file = match example {
            Some(frame) => {
                let file = File::create(dir.join(INPUT_EXAMPLE_FILE))?;
                serde_json::to_writer_pretty(BufWriter::new(file), &input_example(frame)?)?;
                Some(INPUT_EXAMPLE_FILE.to_string())
            }
            None => None,
        };

        let metadata = ModelMetadata {
            artifact_path: artifact_path.to_string(),
            run_id: run_id.map(str::to_string),
            flavor: FLAVOR.to_string(),
            model_file: MODEL_DATA_FILE.to_string(),
            created_at: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            classes: model.classes().to_vec(),
            signature: signature.clone(),
            input_example: input_example_file,
        };
        let file = File::create(dir.join(MLMODEL_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &metadata)?;

        info!(dir = %dir.display(), artifact_path, "model written");
        Ok(metadata)
    }

    /// Load a model directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let meta_path: PathBuf = dir.join(MLMODEL_FILE);
        let file = File::open(&meta_path).map_err(|e| {
            ForestError::SerializationError(format!("Failed to open {}: {}", meta_path.display(), e))
        })?;
        let metadata: ModelMetadata = serde_json::from_reader(BufReader::new(file))?;
        if metadata.flavor != FLAVOR {
            return Err(ForestError::SerializationError(format!(
                "Unsupported model flavor '{}'",
                metadata.flavor
            )));
        }
        let model: ForestClassifierModel = load_bincode(dir.join(&metadata.model_file))?;
        Ok(Self { metadata, model })
    }

    /// Validate `input` against the signature, then predict
    pub fn predict(&self, input: &DataFrame, params: Option<&PredictParams>) -> Result<PredictionOutput> {
        self.metadata.signature.validate_input(input)?;
        self.model.predict(input, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::random_forest::ForestParams;
    use ndarray::array;

    fn fitted_model() -> ForestClassifierModel {
        let x = array![[0.0, 1.0], [0.1, 1.1], [0.2, 0.9], [1.0, 0.0], [1.1, 0.1], [0.9, 0.2]];
        let y = array![2.0, 2.0, 2.0, 5.0, 5.0, 5.0];
        let mut forest = RandomForest::new(ForestParams {
            n_estimators: 7,
            random_state: Some(3),
            ..ForestParams::default()
        });
        forest.fit(&x, &y).unwrap();
        ForestClassifierModel::new(forest, vec!["f1".to_string(), "f2".to_string()]).unwrap()
    }

    fn input() -> DataFrame {
        df! {
            "f1" => &[0.05, 1.05],
            "f2" => &[1.0, 0.05],
        }
        .unwrap()
    }

    #[test]
    fn test_predict_modes() {
        let model = fitted_model();
        let df = input();

        let labels = model
            .predict(&df, Some(&PredictParams::new().with_predict_method("predict")))
            .unwrap();
        assert_eq!(labels, PredictionOutput::Labels(array![2.0, 5.0]));

        let proba = match model.predict(&df, None).unwrap() {
            PredictionOutput::Probabilities(p) => p,
            other => panic!("unexpected output {:?}", other),
        };
        assert_eq!(proba.shape(), &[2, 2]);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }

        let log_proba = match model
            .predict(&df, Some(&PredictParams::new().with_predict_method("predict_log_proba")))
            .unwrap()
        {
            PredictionOutput::LogProbabilities(p) => p,
            other => panic!("unexpected output {:?}", other),
        };
        assert!((log_proba[[0, 0]] - proba[[0, 0]].ln()).abs() < 1e-12);
    }

    #[test]
    fn test_unsupported_method() {
        let model = fitted_model();
        let err = model
            .predict(&input(), Some(&PredictParams::new().with_predict_method("transform")))
            .unwrap_err();
        assert!(matches!(err, ForestError::UnsupportedPredictMethod(m) if m == "transform"));
    }

    #[test]
    fn test_unfitted_forest_rejected() {
        let err = ForestClassifierModel::new(RandomForest::default(), vec![]).unwrap_err();
        assert!(matches!(err, ForestError::ModelNotFitted));
    }

    #[test]
    fn test_output_to_dataframe() {
        let model = fitted_model();
        let out = model.predict(&input(), None).unwrap();
        let df = out.to_dataframe(model.classes()).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["proba_2", "proba_5"]);
    }

    #[test]
    fn test_bincode_round_trip_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rf_clf.bin");
        let model = fitted_model();
        save_bincode(model.forest(), &path).unwrap();

        let restored: RandomForest = load_bincode(&path).unwrap();
        let x = array![[0.3, 0.7]];
        assert_eq!(restored.predict_proba(&x).unwrap(), model.forest().predict_proba(&x).unwrap());
    }

    #[test]
    fn test_logged_model_directory() {
        let dir = tempfile::tempdir().unwrap();
        let model = fitted_model();
        let sample = input();
        let signature = ModelSignature::infer(&sample, &[("predict_method", "predict")]).unwrap();

        let meta = LoggedModel::write(dir.path(), &model, &signature, "rf_model", Some("abc"), Some(&sample))
            .unwrap();
        assert_eq!(meta.classes, vec![2.0, 5.0]);
        assert!(dir.path().join(MLMODEL_FILE).exists());
        assert!(dir.path().join(INPUT_EXAMPLE_FILE).exists());

        let loaded = LoggedModel::load(dir.path()).unwrap();
        assert_eq!(loaded.model.default_method(), PredictMethod::Predict);
        assert_eq!(loaded.metadata.run_id.as_deref(), Some("abc"));
        let out = loaded.predict(&sample, None).unwrap();
        assert_eq!(out, PredictionOutput::Labels(array![2.0, 5.0]));

        let missing = df! { "f1" => &[0.0] }.unwrap();
        assert!(matches!(loaded.predict(&missing, None), Err(ForestError::FeatureNotFound(_))));
    }
}
