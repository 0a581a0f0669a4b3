//! Classification scoring functions used by cross-validation and search

use super::random_forest::RandomForest;
use crate::error::{ForestError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const LOG_LOSS_EPS: f64 = 1e-15;

/// Positive class for the binary `precision`, `recall` and `f1` scorers
pub const POS_LABEL: f64 = 1.0;

/// Named scoring function. Higher is always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scorer {
    Accuracy,
    BalancedAccuracy,
    /// Binary precision of [`POS_LABEL`]
    Precision,
    PrecisionMacro,
    PrecisionWeighted,
    Recall,
    RecallMacro,
    RecallWeighted,
    F1,
    F1Macro,
    F1Weighted,
    NegLogLoss,
}

impl Scorer {
    pub fn name(&self) -> &'static str {
        match self {
            Scorer::Accuracy => "accuracy",
            Scorer::BalancedAccuracy => "balanced_accuracy",
            Scorer::Precision => "precision",
            Scorer::Recall => "recall",
            Scorer::F1 => "f1",
            Scorer::PrecisionMacro => "precision_macro",
            Scorer::PrecisionWeighted => "precision_weighted",
            Scorer::RecallMacro => "recall_macro",
            Scorer::RecallWeighted => "recall_weighted",
            Scorer::F1Macro => "f1_macro",
            Scorer::F1Weighted => "f1_weighted",
            Scorer::NegLogLoss => "neg_log_loss",
        }
    }

    /// Score a fitted forest on `(x, y)`
    pub fn score(&self, model: &RandomForest, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        match self {
            Scorer::NegLogLoss => {
                let proba = model.predict_proba(x)?;
                Ok(-log_loss(y, &proba, model.classes())?)
            }
            _ => {
                let y_pred = model.predict(x)?;
                self.score_labels(y, &y_pred)
            }
        }
    }

    /// Score hard predictions. Fails for probability-based scorers.
    pub fn score_labels(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(ForestError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(ForestError::ValidationError("Cannot score an empty set".to_string()));
        }

        let stats = ClassStats::compute(y_true, y_pred);
        Ok(match self {
            Scorer::Accuracy => accuracy(y_true, y_pred),
            Scorer::BalancedAccuracy => stats.balanced_accuracy(),
            Scorer::Precision => stats.binary(self.name(), ClassStats::precision)?,
            Scorer::Recall => stats.binary(self.name(), ClassStats::recall)?,
            Scorer::F1 => stats.binary(self.name(), ClassStats::f1)?,
            Scorer::PrecisionMacro => stats.macro_avg(ClassStats::precision),
            Scorer::PrecisionWeighted => stats.weighted_avg(ClassStats::precision),
            Scorer::RecallMacro => stats.macro_avg(ClassStats::recall),
            Scorer::RecallWeighted => stats.weighted_avg(ClassStats::recall),
            Scorer::F1Macro => stats.macro_avg(ClassStats::f1),
            Scorer::F1Weighted => stats.weighted_avg(ClassStats::f1),
            Scorer::NegLogLoss => {
                return Err(ForestError::ValidationError(
                    "neg_log_loss needs class probabilities".to_string(),
                ))
            }
        })
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scorer {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "accuracy" => Ok(Scorer::Accuracy),
            "balanced_accuracy" => Ok(Scorer::BalancedAccuracy),
            "precision_macro" => Ok(Scorer::PrecisionMacro),
            "precision" => Ok(Scorer::Precision),
            "precision_weighted" => Ok(Scorer::PrecisionWeighted),
            "recall" => Ok(Scorer::Recall),
            "recall_macro" => Ok(Scorer::RecallMacro),
            "recall_weighted" => Ok(Scorer::RecallWeighted),
            "f1" => Ok(Scorer::F1),
            "f1_macro" => Ok(Scorer::F1Macro),
            "f1_weighted" => Ok(Scorer::F1Weighted),
            "neg_log_loss" => Ok(Scorer::NegLogLoss),
            other => Err(ForestError::ConfigError(format!("Unknown scorer: {}", other))),
        }
    }
}

/// Fraction of exact label matches
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Mean negative log-likelihood of the true labels. `classes` gives the
/// label of each probability column; labels the model never saw score as
/// probability zero (clipped).
pub fn log_loss(y_true: &Array1<f64>, proba: &Array2<f64>, classes: &[f64]) -> Result<f64> {
    if proba.nrows() != y_true.len() || proba.ncols() != classes.len() {
        return Err(ForestError::ShapeError {
            expected: format!("({}, {})", y_true.len(), classes.len()),
            actual: format!("{:?}", proba.dim()),
        });
    }
    let total: f64 = y_true
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let p = classes
                .iter()
                .position(|c| c == label)
                .map_or(0.0, |j| proba[[i, j]]);
            -p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS).ln()
        })
        .sum();
    Ok(total / y_true.len() as f64)
}

/// Per-class confusion counts over the union of true and predicted labels
struct ClassStats {
    labels: Vec<f64>,
    tp: Vec<f64>,
    fp: Vec<f64>,
    fn_: Vec<f64>,
    support: Vec<f64>,
}

impl ClassStats {
    fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut labels: Vec<f64> = y_true.iter().chain(y_pred.iter()).copied().collect();
        labels.sort_by(|a, b| a.total_cmp(b));
        labels.dedup();

        let n = labels.len();
        let mut stats = Self {
            labels,
            tp: vec![0.0; n],
            fp: vec![0.0; n],
            fn_: vec![0.0; n],
            support: vec![0.0; n],
        };

        let idx = |labels: &[f64], v: &f64| labels.binary_search_by(|c| c.total_cmp(v)).unwrap_or(0);
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            let ti = idx(&stats.labels, t);
            stats.support[ti] += 1.0;
            if t == p {
                stats.tp[ti] += 1.0;
            } else {
                stats.fn_[ti] += 1.0;
                let pi = idx(&stats.labels, p);
                stats.fp[pi] += 1.0;
            }
        }
        stats
    }

    fn precision(&self, k: usize) -> f64 {
        ratio(self.tp[k], self.tp[k] + self.fp[k])
    }

    fn recall(&self, k: usize) -> f64 {
        ratio(self.tp[k], self.tp[k] + self.fn_[k])
    }

    fn f1(&self, k: usize) -> f64 {
        let p = self.precision(k);
        let r = self.recall(k);
        ratio(2.0 * p * r, p + r)
    }

    fn macro_avg(&self, metric: fn(&Self, usize) -> f64) -> f64 {
        let n = self.tp.len();
        (0..n).map(|k| metric(self, k)).sum::<f64>() / n as f64
    }

    fn weighted_avg(&self, metric: fn(&Self, usize) -> f64) -> f64 {
        let total: f64 = self.support.iter().sum();
        (0..self.tp.len())
            .map(|k| metric(self, k) * self.support[k])
            .sum::<f64>()
            / total
    }

    /// `metric` for [`POS_LABEL`]. Fails for multiclass labels, and for two
    /// labels that do not include the positive one.
    fn binary(&self, name: &str, metric: fn(&Self, usize) -> f64) -> Result<f64> {
        if self.labels.len() > 2 {
            return Err(ForestError::ValidationError(format!(
                "{} is a binary scorer but found {} labels; use {}_macro or {}_weighted",
                name,
                self.labels.len(),
                name,
                name
            )));
        }
        match self.labels.iter().position(|&l| l == POS_LABEL) {
            Some(k) => Ok(metric(self, k)),
            None if self.labels.len() < 2 => Ok(0.0),
            None => Err(ForestError::ValidationError(format!(
                "{} needs positive label {} among {:?}",
                name, POS_LABEL, self.labels
            ))),
        }
    }

    fn balanced_accuracy(&self) -> f64 {
        let present: Vec<usize> = (0..self.tp.len()).filter(|&k| self.support[k] > 0.0).collect();
        present.iter().map(|&k| self.recall(k)).sum::<f64>() / present.len() as f64
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let acc = Scorer::Accuracy.score_labels(&y_true, &y_pred).unwrap();
        assert!((acc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_precision_recall_f1() {
        // class 0: tp=1 fp=1 fn=1; class 1: tp=2 fp=1 fn=1
        let y_true = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 0.0, 1.0, 1.0];

        let p_macro = Scorer::PrecisionMacro.score_labels(&y_true, &y_pred).unwrap();
        assert!((p_macro - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);

        let r_weighted = Scorer::RecallWeighted.score_labels(&y_true, &y_pred).unwrap();
        assert!((r_weighted - (0.5 * 2.0 + 2.0 / 3.0 * 3.0) / 5.0).abs() < 1e-12);

        let f1 = Scorer::F1Macro.score_labels(&y_true, &y_pred).unwrap();
        assert!((f1 - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_accuracy_ignores_predicted_only_labels() {
        let y_true = array![0.0, 0.0, 0.0, 1.0];
        let y_pred = array![0.0, 0.0, 2.0, 1.0];
        let score = Scorer::BalancedAccuracy.score_labels(&y_true, &y_pred).unwrap();
        assert!((score - (2.0 / 3.0 + 1.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss() {
        let y_true = array![0.0, 1.0];
        let proba = array![[0.8, 0.2], [0.4, 0.6]];
        let loss = log_loss(&y_true, &proba, &[0.0, 1.0]).unwrap();
        let expected = -(0.8f64.ln() + 0.6f64.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss_unseen_label_is_clipped() {
        let y_true = array![5.0];
        let proba = array![[1.0]];
        let loss = log_loss(&y_true, &proba, &[0.0]).unwrap();
        assert!((loss + LOG_LOSS_EPS.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_scorer_parsing() {
        assert_eq!(Scorer::from_str("f1").unwrap(), Scorer::F1);
        assert_eq!(Scorer::from_str("f1_weighted").unwrap(), Scorer::F1Weighted);
        assert_eq!(Scorer::from_str("recall").unwrap(), Scorer::Recall);
        assert_eq!(Scorer::from_str(" Accuracy ").unwrap(), Scorer::Accuracy);
        assert_eq!(Scorer::NegLogLoss.to_string(), "neg_log_loss");
        assert!(Scorer::from_str("roc_auc").is_err());
    }

    #[test]
    fn test_binary_scores_use_positive_label() {
        // positive class 1: tp=2 fp=1 fn=1
        let y_true = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 0.0, 1.0, 1.0];

        let precision = Scorer::Precision.score_labels(&y_true, &y_pred).unwrap();
        let recall = Scorer::Recall.score_labels(&y_true, &y_pred).unwrap();
        let f1 = Scorer::F1.score_labels(&y_true, &y_pred).unwrap();
        assert!((precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((f1 - 2.0 / 3.0).abs() < 1e-12);

        // differs from the weighted average on an imbalanced set
        let y_true = array![0.0, 0.0, 0.0, 1.0];
        let y_pred = array![0.0, 0.0, 1.0, 1.0];
        let f1 = Scorer::F1.score_labels(&y_true, &y_pred).unwrap();
        let f1_weighted = Scorer::F1Weighted.score_labels(&y_true, &y_pred).unwrap();
        assert!((f1 - 2.0 / 3.0).abs() < 1e-12);
        assert!((f1 - f1_weighted).abs() > 1e-3);
    }

    #[test]
    fn test_binary_scores_reject_multiclass() {
        let y = array![0.0, 1.0, 2.0];
        let err = Scorer::F1.score_labels(&y, &y).unwrap_err();
        assert!(err.to_string().contains("f1_weighted"));

        let y = array![0.0, 2.0];
        assert!(Scorer::Precision.score_labels(&y, &y).is_err());
    }

    #[test]
    fn test_binary_scores_without_positive_predictions() {
        let y = array![0.0, 0.0];
        assert_eq!(Scorer::Recall.score_labels(&y, &y).unwrap(), 0.0);
    }

    #[test]
    fn test_label_scorer_rejects_log_loss() {
        let y = array![1.0];
        assert!(Scorer::NegLogLoss.score_labels(&y, &y).is_err());
    }
}
