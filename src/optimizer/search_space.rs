//! Hyperparameter distributions built from the configured ranges

use crate::config::{integral_param, ParamSpec, TrainParams};
use crate::error::{ForestError, Result};
use crate::training::random_forest::{ForestParams, MinSamplesSplit};
use serde::{Deserialize, Serialize};

pub const N_ESTIMATORS_STEP: f64 = 5.0;
pub const MAX_DEPTH_STEP: f64 = 1.0;
pub const MIN_SAMPLES_SPLIT_STEP: f64 = 0.1;
pub const MIN_SAMPLES_LEAF_STEP: f64 = 1.0;

/// Evenly spaced values in the half-open interval `[start, stop)`.
///
/// Element `i` is `start + i * step`; the length is
/// `ceil((stop - start) / step)`, or zero when that is not positive.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step == 0.0 || !step.is_finite() || !start.is_finite() || !stop.is_finite() {
        return Vec::new();
    }
    let len = ((stop - start) / step).ceil();
    if len <= 0.0 {
        return Vec::new();
    }
    (0..len as usize).map(|i| start + i as f64 * step).collect()
}

/// Round to two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Candidate values for each searchable hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDistributions {
    pub n_estimators: Vec<f64>,
    /// `None` keeps trees unbounded
    pub max_depth: Option<Vec<f64>>,
    pub min_samples_split: Vec<f64>,
    pub min_samples_leaf: Vec<f64>,
}

/// One sampled point of a [`ParamDistributions`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub n_estimators: f64,
    pub max_depth: Option<f64>,
    pub min_samples_split: f64,
    pub min_samples_leaf: f64,
}

fn distribution(name: &str, spec: &ParamSpec, step: f64) -> Result<Vec<f64>> {
    match spec {
        ParamSpec::Fixed(v) => Ok(vec![*v]),
        ParamSpec::Range(_) => {
            let (first, last) = spec.first().zip(spec.last()).ok_or_else(|| {
                ForestError::ConfigError(format!("model_parameters.{} range must not be empty", name))
            })?;
            let values = arange(round2(first), round2(last), step);
            if values.is_empty() {
                return Err(ForestError::ConfigError(format!(
                    "model_parameters.{} range [{}, {}) with step {} has no values",
                    name, first, last, step
                )));
            }
            Ok(values)
        }
    }
}

/// Build the search distributions from the configured model parameters.
///
/// A range `[first, ..., last]` becomes
/// `arange(round(first, 2), round(last, 2), step)`; a fixed value becomes a
/// single candidate.
pub fn create_hyper_parameters_range(params: &TrainParams) -> Result<ParamDistributions> {
    let mp = &params.model_parameters;
    Ok(ParamDistributions {
        n_estimators: distribution("n_estimators", &mp.n_estimators, N_ESTIMATORS_STEP)?,
        max_depth: mp
            .max_depth
            .as_ref()
            .map(|spec| distribution("max_depth", spec, MAX_DEPTH_STEP))
            .transpose()?,
        min_samples_split: distribution("min_samples_split", &mp.min_samples_split, MIN_SAMPLES_SPLIT_STEP)?,
        min_samples_leaf: distribution("min_samples_leaf", &mp.min_samples_leaf, MIN_SAMPLES_LEAF_STEP)?,
    })
}

impl ParamDistributions {
    /// `(name, values)` in a fixed order; unbounded depth is omitted
    pub fn entries(&self) -> Vec<(&'static str, &[f64])> {
        let mut entries = vec![("n_estimators", self.n_estimators.as_slice())];
        if let Some(depths) = &self.max_depth {
            entries.push(("max_depth", depths.as_slice()));
        }
        entries.push(("min_samples_split", self.min_samples_split.as_slice()));
        entries.push(("min_samples_leaf", self.min_samples_leaf.as_slice()));
        entries
    }

    fn depth_len(&self) -> usize {
        self.max_depth.as_ref().map_or(1, Vec::len)
    }

    /// Number of distinct candidates
    pub fn grid_size(&self) -> usize {
        self.n_estimators.len() * self.depth_len() * self.min_samples_split.len() * self.min_samples_leaf.len()
    }

    /// Candidate at flat grid position `index` (row-major over
    /// `n_estimators, max_depth, min_samples_split, min_samples_leaf`)
    pub fn candidate(&self, index: usize) -> Candidate {
        let mut rem = index;
        let leaf = rem % self.min_samples_leaf.len();
        rem /= self.min_samples_leaf.len();
        let split = rem % self.min_samples_split.len();
        rem /= self.min_samples_split.len();
        let depth = rem % self.depth_len();
        rem /= self.depth_len();

        Candidate {
            n_estimators: self.n_estimators[rem],
            max_depth: self.max_depth.as_ref().map(|d| d[depth]),
            min_samples_split: self.min_samples_split[split],
            min_samples_leaf: self.min_samples_leaf[leaf],
        }
    }
}

impl Candidate {
    /// Apply this point to `base`, validating each value
    pub fn apply(&self, base: &ForestParams) -> Result<ForestParams> {
        Ok(ForestParams {
            n_estimators: integral_param("n_estimators", self.n_estimators, 1)?,
            max_depth: self
                .max_depth
                .map(|d| integral_param("max_depth", d, 1))
                .transpose()?,
            min_samples_split: MinSamplesSplit::from_value(self.min_samples_split)?,
            min_samples_leaf: integral_param("min_samples_leaf", self.min_samples_leaf, 1)?,
            ..base.clone()
        })
    }
}
