//! Prediction method selection

use crate::error::{ForestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which forest output a prediction call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictMethod {
    /// Class labels
    Predict,
    /// Class probabilities, one column per class
    #[default]
    PredictProba,
    /// Natural log of the class probabilities
    PredictLogProba,
}

impl PredictMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictMethod::Predict => "predict",
            PredictMethod::PredictProba => "predict_proba",
            PredictMethod::PredictLogProba => "predict_log_proba",
        }
    }
}

impl fmt::Display for PredictMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictMethod {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "predict" => Ok(PredictMethod::Predict),
            "predict_proba" => Ok(PredictMethod::PredictProba),
            "predict_log_proba" => Ok(PredictMethod::PredictLogProba),
            other => Err(ForestError::UnsupportedPredictMethod(other.to_string())),
        }
    }
}

/// Per-call prediction parameters.
///
/// The method is kept as free text so an unknown name is reported when the
/// prediction runs rather than when the parameters are built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictParams {
    #[serde(default)]
    pub predict_method: Option<String>,
}

impl PredictParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predict_method(mut self, method: impl Into<String>) -> Self {
        self.predict_method = Some(method.into());
        self
    }

    /// The requested method, or `default` when none was given
    pub fn resolve(&self, default: PredictMethod) -> Result<PredictMethod> {
        match &self.predict_method {
            Some(name) => name.parse(),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_methods() {
        assert_eq!("predict".parse::<PredictMethod>().unwrap(), PredictMethod::Predict);
        assert_eq!("predict_proba".parse::<PredictMethod>().unwrap(), PredictMethod::PredictProba);
        assert_eq!(
            "predict_log_proba".parse::<PredictMethod>().unwrap(),
            PredictMethod::PredictLogProba
        );
    }

    #[test]
    fn test_unknown_method_message() {
        let err = "decision_function".parse::<PredictMethod>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "The prediction method decision_function is not supported."
        );
    }

    #[test]
    fn test_params_resolve_default() {
        let params = PredictParams::new();
        assert_eq!(params.resolve(PredictMethod::PredictProba).unwrap(), PredictMethod::PredictProba);

        let params = PredictParams::new().with_predict_method("predict");
        assert_eq!(params.resolve(PredictMethod::PredictProba).unwrap(), PredictMethod::Predict);
    }
}
