//! Run configuration loaded from the JSON file passed on the command line.

use crate::error::{ForestError, Result};
use crate::training::cross_validation::{CVStrategy, CrossValidator};
use crate::training::decision_tree::Criterion;
use crate::training::metrics::Scorer;
use crate::training::random_forest::{ForestParams, MaxFeatures, MinSamplesSplit};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// A hyperparameter given either as a single value or as a list whose first
/// and last elements bound a search range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamSpec {
    Fixed(f64),
    Range(Vec<f64>),
}

impl ParamSpec {
    /// First element (the value itself for a fixed spec)
    pub fn first(&self) -> Option<f64> {
        match self {
            ParamSpec::Fixed(v) => Some(*v),
            ParamSpec::Range(values) => values.first().copied(),
        }
    }

    /// Last element (the value itself for a fixed spec)
    pub fn last(&self) -> Option<f64> {
        match self {
            ParamSpec::Fixed(v) => Some(*v),
            ParamSpec::Range(values) => values.last().copied(),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, ParamSpec::Range(_))
    }

    /// The fixed value, or `None` for a range
    pub fn fixed(&self) -> Option<f64> {
        match self {
            ParamSpec::Fixed(v) => Some(*v),
            ParamSpec::Range(_) => None,
        }
    }
}

/// `max_features` as written in the config: a strategy name or a number.
///
/// Numbers in `(0, 1]` are fractions of the feature count, so `1.0` keeps
/// every feature. Whole numbers above 1 are feature counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxFeaturesSetting {
    Name(String),
    Number(f64),
}

impl MaxFeaturesSetting {
    pub fn resolve(&self) -> Result<MaxFeatures> {
        match self {
            MaxFeaturesSetting::Name(name) => match name.to_lowercase().as_str() {
                "sqrt" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                "all" | "none" => Ok(MaxFeatures::All),
                other => Err(ForestError::InvalidParameter {
                    name: "max_features".to_string(),
                    value: other.to_string(),
                    reason: "expected sqrt, log2, all or a number".to_string(),
                }),
            },
            MaxFeaturesSetting::Number(v) if (*v - 1.0).abs() < f64::EPSILON => Ok(MaxFeatures::All),
            MaxFeaturesSetting::Number(v) if *v > 0.0 && *v < 1.0 => Ok(MaxFeatures::Fraction(*v)),
            MaxFeaturesSetting::Number(v) => Ok(MaxFeatures::Fixed(integral_param("max_features", *v, 1)?)),
        }
    }
}

/// Forest hyperparameters section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: ParamSpec,
    #[serde(default)]
    pub max_depth: Option<ParamSpec>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: ParamSpec,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: ParamSpec,
    #[serde(default)]
    pub max_features: Option<MaxFeaturesSetting>,
    #[serde(default)]
    pub criterion: Criterion,
    #[serde(default = "default_true")]
    pub bootstrap: bool,
    #[serde(default)]
    pub oob_score: bool,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: None,
            criterion: Criterion::Gini,
            bootstrap: true,
            oob_score: false,
        }
    }
}

/// Cross-validation section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    #[serde(default = "default_n_splits")]
    pub n_splits: usize,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    #[serde(default = "default_true")]
    pub stratified: bool,
    #[serde(default = "default_scoring")]
    pub scoring: Vec<String>,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            n_splits: default_n_splits(),
            shuffle: true,
            stratified: true,
            scoring: default_scoring(),
        }
    }
}

/// Randomized search section, used when any hyperparameter is a range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    /// Scorer used to pick the best candidate (first CV scorer when unset)
    #[serde(default)]
    pub refit: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: default_n_iter(),
            refit: None,
        }
    }
}

/// Full training job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainParams {
    /// Target column name
    pub target: String,
    /// Artifact path the wrapped model is logged under
    pub model_name: String,
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
    #[serde(default)]
    pub run_name: Option<String>,
    /// Registry name; the model is only registered when set
    #[serde(default)]
    pub registered_model_name: Option<String>,
    #[serde(default)]
    pub random_seed: u64,
    #[serde(default)]
    pub feature_importance_threshold: f64,
    #[serde(default)]
    pub model_parameters: ModelParameters,
    #[serde(default)]
    pub cross_validation: CrossValidationConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_n_estimators() -> ParamSpec {
    ParamSpec::Fixed(100.0)
}
fn default_min_samples_split() -> ParamSpec {
    ParamSpec::Fixed(2.0)
}
fn default_min_samples_leaf() -> ParamSpec {
    ParamSpec::Fixed(1.0)
}
fn default_true() -> bool {
    true
}
fn default_n_splits() -> usize {
    5
}
fn default_n_iter() -> usize {
    10
}
fn default_experiment_name() -> String {
    "Default".to_string()
}
fn default_scoring() -> Vec<String> {
    ["accuracy", "precision_weighted", "recall_weighted", "f1_weighted"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Load and validate a JSON configuration file
pub fn load_json(path: impl AsRef<Path>) -> Result<TrainParams> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ForestError::ConfigError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let params: TrainParams = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ForestError::ConfigError(format!("Invalid config {}: {}", path.display(), e)))?;
    params.validate()?;
    Ok(params)
}

impl TrainParams {
    /// Minimal configuration for a target column
    pub fn new(target: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            model_name: model_name.into(),
            experiment_name: default_experiment_name(),
            run_name: None,
            registered_model_name: None,
            random_seed: 0,
            feature_importance_threshold: 0.0,
            model_parameters: ModelParameters::default(),
            cross_validation: CrossValidationConfig::default(),
            search: SearchConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(ForestError::ConfigError("target must not be empty".to_string()));
        }
        if self.model_name.trim().is_empty() {
            return Err(ForestError::ConfigError("model_name must not be empty".to_string()));
        }
        if self.cross_validation.n_splits < 2 {
            return Err(ForestError::ConfigError(format!(
                "cross_validation.n_splits must be at least 2, got {}",
                self.cross_validation.n_splits
            )));
        }
        if self.cross_validation.scoring.is_empty() {
            return Err(ForestError::ConfigError(
                "cross_validation.scoring must name at least one scorer".to_string(),
            ));
        }
        self.scorers()?;
        self.refit_scorer()?;
        if self.search.n_iter == 0 {
            return Err(ForestError::ConfigError("search.n_iter must be positive".to_string()));
        }

        let mp = &self.model_parameters;
        let specs = [
            ("n_estimators", Some(&mp.n_estimators)),
            ("max_depth", mp.max_depth.as_ref()),
            ("min_samples_split", Some(&mp.min_samples_split)),
            ("min_samples_leaf", Some(&mp.min_samples_leaf)),
        ];
        for (name, spec) in specs {
            if let Some(ParamSpec::Range(values)) = spec {
                if values.is_empty() {
                    return Err(ForestError::ConfigError(format!(
                        "model_parameters.{} range must not be empty",
                        name
                    )));
                }
            }
        }
        if let Some(setting) = &mp.max_features {
            setting.resolve()?;
        }
        Ok(())
    }

    /// Whether any searchable hyperparameter is given as a range
    pub fn has_ranges(&self) -> bool {
        let mp = &self.model_parameters;
        mp.n_estimators.is_range()
            || mp.max_depth.as_ref().map_or(false, ParamSpec::is_range)
            || mp.min_samples_split.is_range()
            || mp.min_samples_leaf.is_range()
    }

    pub fn scorers(&self) -> Result<Vec<Scorer>> {
        self.cross_validation
            .scoring
            .iter()
            .map(|s| Scorer::from_str(s))
            .collect()
    }

    pub fn refit_scorer(&self) -> Result<Scorer> {
        match &self.search.refit {
            Some(name) => Scorer::from_str(name),
            None => self.scorers()?.into_iter().next().ok_or_else(|| {
                ForestError::ConfigError("no scorer available for refit".to_string())
            }),
        }
    }

    /// Fold splitter seeded with `random_seed`
    pub fn cross_validator(&self) -> CrossValidator {
        let cv = &self.cross_validation;
        let strategy = if cv.stratified {
            CVStrategy::StratifiedKFold {
                n_splits: cv.n_splits,
                shuffle: cv.shuffle,
            }
        } else {
            CVStrategy::KFold {
                n_splits: cv.n_splits,
                shuffle: cv.shuffle,
            }
        };
        CrossValidator::new(strategy).with_random_state(self.random_seed)
    }

    /// Forest parameters with the non-searchable settings applied and the
    /// searchable ones taken from fixed values.
    ///
    /// Fails if any searchable parameter is a range.
    pub fn fixed_forest_params(&self) -> Result<ForestParams> {
        let mp = &self.model_parameters;
        let fixed = |name: &str, spec: &ParamSpec| {
            spec.fixed().ok_or_else(|| {
                ForestError::ConfigError(format!(
                    "model_parameters.{} is a range; run a search to resolve it",
                    name
                ))
            })
        };

        let mut params = self.base_forest_params()?;
        params.n_estimators = integral_param("n_estimators", fixed("n_estimators", &mp.n_estimators)?, 1)?;
        params.max_depth = match &mp.max_depth {
            Some(spec) => Some(integral_param("max_depth", fixed("max_depth", spec)?, 1)?),
            None => None,
        };
        params.min_samples_split =
            MinSamplesSplit::from_value(fixed("min_samples_split", &mp.min_samples_split)?)?;
        params.min_samples_leaf =
            integral_param("min_samples_leaf", fixed("min_samples_leaf", &mp.min_samples_leaf)?, 1)?;
        Ok(params)
    }

    /// Forest parameters carrying only the settings that are never searched
    pub fn base_forest_params(&self) -> Result<ForestParams> {
        let mp = &self.model_parameters;
        let max_features = match &mp.max_features {
            Some(setting) => setting.resolve()?,
            None => MaxFeatures::Sqrt,
        };
        Ok(ForestParams {
            max_features,
            criterion: mp.criterion,
            bootstrap: mp.bootstrap,
            oob_score: mp.oob_score,
            random_state: Some(self.random_seed),
            ..ForestParams::default()
        })
    }
}

/// Interpret a config number as a whole count no smaller than `min`
pub(crate) fn integral_param(name: &str, value: f64, min: usize) -> Result<usize> {
    if !value.is_finite() || (value - value.round()).abs() > 1e-9 || value < min as f64 {
        return Err(ForestError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: format!("expected an integer >= {}", min),
        });
    }
    Ok(value.round() as usize)
}
