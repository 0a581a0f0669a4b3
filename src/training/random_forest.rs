//! Random Forest classifier

use super::decision_tree::{argmax, Criterion, DecisionTree};
use crate::error::{ForestError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

impl std::fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::Fraction(v) => write!(f, "{}", v),
            MaxFeatures::Fixed(n) => write!(f, "{}", n),
            MaxFeatures::All => write!(f, "all"),
        }
    }
}

/// Minimum samples required to split a node: an absolute count, or a
/// fraction of the training set size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MinSamplesSplit {
    Count(usize),
    Fraction(f64),
}

impl MinSamplesSplit {
    /// Integers >= 2 are counts, values in (0, 1] are fractions
    pub fn from_value(value: f64) -> Result<Self> {
        let is_integral = (value - value.round()).abs() < 1e-9;
        if is_integral && value >= 2.0 {
            Ok(MinSamplesSplit::Count(value.round() as usize))
        } else if value > 0.0 && value <= 1.0 {
            Ok(MinSamplesSplit::Fraction(value))
        } else {
            Err(ForestError::InvalidParameter {
                name: "min_samples_split".to_string(),
                value: value.to_string(),
                reason: "expected an integer >= 2 or a fraction in (0, 1]".to_string(),
            })
        }
    }

    /// Absolute sample count for a training set of `n_samples`
    pub fn resolve(&self, n_samples: usize) -> usize {
        match *self {
            MinSamplesSplit::Count(n) => n.max(2),
            MinSamplesSplit::Fraction(f) => ((f * n_samples as f64).ceil() as usize).max(2),
        }
    }
}

impl std::fmt::Display for MinSamplesSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MinSamplesSplit::Count(n) => write!(f, "{}", n),
            MinSamplesSplit::Fraction(v) => write!(f, "{}", v),
        }
    }
}

/// Hyperparameters of a forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: MinSamplesSplit,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub bootstrap: bool,
    pub oob_score: bool,
    pub random_state: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: MinSamplesSplit::Count(2),
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            criterion: Criterion::Gini,
            bootstrap: true,
            oob_score: false,
            random_state: None,
        }
    }
}

impl ForestParams {
    /// Flattened `name -> value` pairs for run logging
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            (
                "max_depth".to_string(),
                self.max_depth.map_or("None".to_string(), |d| d.to_string()),
            ),
            ("min_samples_split".to_string(), self.min_samples_split.to_string()),
            ("min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
            ("max_features".to_string(), self.max_features.to_string()),
            ("criterion".to_string(), self.criterion.to_string()),
            ("bootstrap".to_string(), self.bootstrap.to_string()),
            ("oob_score".to_string(), self.oob_score.to_string()),
            (
                "random_state".to_string(),
                self.random_state.map_or("None".to_string(), |s| s.to_string()),
            ),
        ]
    }
}

/// Random Forest classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub params: ForestParams,
    oob_score_value: Option<f64>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
    /// Sorted distinct labels seen during fit
    classes: Vec<f64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            trees: Vec::new(),
            params,
            oob_score_value: None,
            feature_importances: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    /// Create a new classifier forest with default settings
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self::new(ForestParams {
            n_estimators,
            ..ForestParams::default()
        })
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.params.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: MinSamplesSplit) -> Self {
        self.params.min_samples_split = min_samples_split;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.params.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.params.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.params.random_state = Some(seed);
        self
    }

    /// Enable OOB score computation
    pub fn with_oob_score(mut self, oob_score: bool) -> Self {
        self.params.oob_score = oob_score;
        self
    }

    /// Unfitted copy with the same parameters
    pub fn unfitted(&self) -> Self {
        Self::new(self.params.clone())
    }

    /// Fit the forest to training data. Labels are arbitrary floats treated
    /// as discrete classes.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ForestError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(ForestError::TrainingError("Training set is empty".to_string()));
        }
        if self.params.n_estimators == 0 {
            return Err(ForestError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ForestError::ValidationError("Target contains non-finite values".to_string()));
        }

        self.n_features = n_features;
        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(|a, b| a.total_cmp(b));
        classes.dedup();
        self.classes = classes;
        let n_classes = self.classes.len();
        let encoded = self.encode(y)?;

        let max_features = self.params.max_features.resolve(n_features);
        let min_samples_split = self.params.min_samples_split.resolve(n_samples);
        let base_seed = self.params.random_state.unwrap_or(0);
        let params = &self.params;

        debug!(
            n_estimators = params.n_estimators,
            n_samples,
            n_features,
            n_classes,
            max_features,
            min_samples_split,
            "fitting random forest"
        );

        // Trees are built in parallel; each keeps its in-bag mask for OOB scoring
        let fitted: Vec<(DecisionTree, Vec<bool>)> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if params.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut in_bag = vec![false; n_samples];
                for &i in &sample_indices {
                    in_bag[i] = true;
                }

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Vec<usize> = sample_indices.iter().map(|&i| encoded[i]).collect();

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(min_samples_split)
                    .with_min_samples_leaf(params.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_criterion(params.criterion)
                    .with_random_state(rng.gen());
                if let Some(d) = params.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree.fit(&x_boot, &y_boot, n_classes)?;

                Ok((tree, in_bag))
            })
            .collect::<Result<Vec<_>>>()?;

        let (trees, in_bag): (Vec<DecisionTree>, Vec<Vec<bool>>) = fitted.into_iter().unzip();
        self.trees = trees;
        self.compute_feature_importances();

        self.oob_score_value = if self.params.oob_score && self.params.bootstrap {
            Some(self.compute_oob_score(x, &encoded, &in_bag)?)
        } else {
            None
        };

        Ok(self)
    }

    fn encode(&self, y: &Array1<f64>) -> Result<Vec<usize>> {
        y.iter()
            .map(|v| {
                self.classes
                    .binary_search_by(|c| c.total_cmp(v))
                    .map_err(|_| ForestError::ValidationError(format!("Unknown class label {}", v)))
            })
            .collect()
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (i, &val) in imp.iter().enumerate() {
                    total_importances[i] += val;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for imp in &mut total_importances {
            *imp /= n_trees;
        }

        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    fn compute_oob_score(&self, x: &Array2<f64>, encoded: &[usize], in_bag: &[Vec<bool>]) -> Result<f64> {
        let n_samples = x.nrows();
        let mut votes = Array2::<f64>::zeros((n_samples, self.classes.len()));
        let mut seen = vec![false; n_samples];

        for (tree, mask) in self.trees.iter().zip(in_bag) {
            let oob: Vec<usize> = (0..n_samples).filter(|&i| !mask[i]).collect();
            if oob.is_empty() {
                continue;
            }
            let proba = tree.predict_proba(&x.select(Axis(0), &oob))?;
            for (row, &i) in oob.iter().enumerate() {
                seen[i] = true;
                let mut target = votes.row_mut(i);
                target += &proba.row(row);
            }
        }

        let scored: Vec<usize> = (0..n_samples).filter(|&i| seen[i]).collect();
        if scored.is_empty() {
            return Err(ForestError::TrainingError(
                "No out-of-bag samples; increase n_estimators".to_string(),
            ));
        }
        let correct = scored
            .iter()
            .filter(|&&i| argmax(votes.row(i)) == encoded[i])
            .count();
        Ok(correct as f64 / scored.len() as f64)
    }

    /// Predict class probabilities, columns ordered as [`RandomForest::classes`]
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(ForestError::ModelNotFitted);
        }

        let per_tree: Vec<Array2<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for p in &per_tree {
            proba += p;
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    /// Natural log of [`RandomForest::predict_proba`]; zero probabilities map to `-inf`
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_proba(x)?.mapv(f64::ln))
    }

    /// Make predictions: the class with the highest mean probability
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get OOB score
    pub fn oob_score_value(&self) -> Option<f64> {
        self.oob_score_value
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.2],
            [0.1, 0.0],
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.2],
            [1.0, 1.1],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_classifier() {
        let (x, y) = two_blobs();

        let mut rf = RandomForest::new_classifier(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();
        let accuracy = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| (*p - *a).abs() < 0.5)
            .count() as f64
            / y.len() as f64;

        assert!(accuracy >= 0.8, "Accuracy too low: {}", accuracy);
        assert_eq!(rf.n_trees(), 10);
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let (x, y) = two_blobs();

        let mut rf = RandomForest::new_classifier(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (8, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_predict_log_proba_matches_proba() {
        let (x, y) = two_blobs();

        let mut rf = RandomForest::new_classifier(5).with_random_state(1);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        let log_proba = rf.predict_log_proba(&x).unwrap();
        for (p, lp) in proba.iter().zip(log_proba.iter()) {
            if *p == 0.0 {
                assert_eq!(*lp, f64::NEG_INFINITY);
            } else {
                assert!((p.ln() - lp).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_labels_are_preserved() {
        let x = array![[0.0], [0.1], [5.0], [5.1], [9.0], [9.1]];
        let y = array![3.0, 3.0, 7.5, 7.5, -1.0, -1.0];

        let mut rf = RandomForest::new(ForestParams {
            n_estimators: 15,
            bootstrap: false,
            max_features: MaxFeatures::All,
            ..ForestParams::default()
        });
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.classes(), &[-1.0, 3.0, 7.5]);
        assert_eq!(rf.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let (x, y) = two_blobs();

        let mut a = RandomForest::new_classifier(8).with_random_state(9);
        let mut b = RandomForest::new_classifier(8).with_random_state(9);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0], [5.0, 0.0], [6.0, 0.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut rf = RandomForest::new_classifier(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!(importances[0] >= importances[1]);
    }

    #[test]
    fn test_oob_score() {
        let (x, y) = two_blobs();

        let mut rf = RandomForest::new_classifier(30).with_random_state(3).with_oob_score(true);
        rf.fit(&x, &y).unwrap();

        let score = rf.oob_score_value().unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_min_samples_split_resolution() {
        assert_eq!(MinSamplesSplit::from_value(4.0).unwrap(), MinSamplesSplit::Count(4));
        assert_eq!(MinSamplesSplit::from_value(0.3).unwrap(), MinSamplesSplit::Fraction(0.3));
        assert!(MinSamplesSplit::from_value(1.5).is_err());
        assert!(MinSamplesSplit::from_value(0.0).is_err());

        assert_eq!(MinSamplesSplit::Fraction(0.3).resolve(100), 30);
        assert_eq!(MinSamplesSplit::Fraction(0.001).resolve(100), 2);
        // 1.0 is a fraction, not a count
        assert_eq!(MinSamplesSplit::from_value(1.0).unwrap().resolve(10), 10);
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Log2.resolve(8), 3);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(10), 5);
        assert_eq!(MaxFeatures::Fixed(20).resolve(3), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
    }

    #[test]
    fn test_predict_before_fit() {
        let rf = RandomForest::default();
        let x = array![[1.0, 2.0]];
        assert!(matches!(rf.predict(&x), Err(ForestError::ModelNotFitted)));
    }
}
