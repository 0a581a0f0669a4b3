//! Cross-validation splitters and `cross_validate`

use super::metrics::Scorer;
use super::random_forest::RandomForest;
use crate::error::{ForestError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true }
    }
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => *n_splits,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits for `y.len()` samples
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_samples = y.len();
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(ForestError::ValidationError("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits {
            return Err(ForestError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let ordered = match &self.strategy {
            CVStrategy::KFold { shuffle, .. } => {
                let mut indices: Vec<usize> = (0..n_samples).collect();
                if *shuffle {
                    indices.shuffle(&mut self.rng());
                }
                return Ok(contiguous_folds(&indices, n_splits));
            }
            CVStrategy::StratifiedKFold { shuffle, .. } => self.stratified_order(y, n_splits, *shuffle),
        };

        // Dealing class-grouped indices round-robin keeps both fold sizes and
        // class proportions balanced
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        for (pos, idx) in ordered.into_iter().enumerate() {
            folds[pos % n_splits].push(idx);
        }
        Ok(folds_to_splits(folds))
    }

    fn stratified_order(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Vec<usize> {
        let mut class_indices: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        let mut labels: Vec<f64> = y.to_vec();
        labels.sort_by(|a, b| a.total_cmp(b));
        labels.dedup();
        for (idx, val) in y.iter().enumerate() {
            let class = labels.binary_search_by(|c| c.total_cmp(val)).unwrap_or(0) as u64;
            class_indices.entry(class).or_default().push(idx);
        }

        let mut rng = self.rng();
        let mut ordered = Vec::with_capacity(y.len());
        for (class, indices) in class_indices.iter_mut() {
            if indices.len() < n_splits {
                warn!(
                    class = labels[*class as usize],
                    members = indices.len(),
                    n_splits,
                    "least populated class has fewer members than n_splits"
                );
            }
            if shuffle {
                indices.shuffle(&mut rng);
            }
            ordered.extend_from_slice(indices);
        }
        ordered
    }
}

fn contiguous_folds(indices: &[usize], n_splits: usize) -> Vec<CVSplit> {
    let n_samples = indices.len();
    let mut folds = Vec::with_capacity(n_splits);
    let mut current = 0;
    for i in 0..n_splits {
        let size = n_samples / n_splits + usize::from(i < n_samples % n_splits);
        folds.push(indices[current..current + size].to_vec());
        current += size;
    }
    folds_to_splits(folds)
}

fn folds_to_splits(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
    (0..folds.len())
        .map(|fold_idx| {
            let train_indices = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            CVSplit {
                train_indices,
                test_indices: folds[fold_idx].clone(),
                fold_idx,
            }
        })
        .collect()
}

/// Mean and standard deviation of one score across folds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self { scores, mean_score: 0.0, std_score: 0.0, n_folds };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

/// Per-fold output of [`cross_validate`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossValidateOutput {
    pub fit_time: Vec<f64>,
    pub score_time: Vec<f64>,
    /// `score name -> per-fold training-set scores`
    pub train_scores: BTreeMap<String, Vec<f64>>,
    /// `score name -> per-fold held-out scores`
    pub test_scores: BTreeMap<String, Vec<f64>>,
}

impl CrossValidateOutput {
    pub fn train(&self, scorer: Scorer) -> &[f64] {
        self.train_scores.get(scorer.name()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn test(&self, scorer: Scorer) -> &[f64] {
        self.test_scores.get(scorer.name()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn n_folds(&self) -> usize {
        self.fit_time.len()
    }

    /// Summary keyed as `train_<score>` / `test_<score>`
    pub fn summary(&self) -> BTreeMap<String, CVResults> {
        let train = self
            .train_scores
            .iter()
            .map(|(name, s)| (format!("train_{}", name), CVResults::from_scores(s.clone())));
        let test = self
            .test_scores
            .iter()
            .map(|(name, s)| (format!("test_{}", name), CVResults::from_scores(s.clone())));
        train.chain(test).collect()
    }
}

/// Fit an unfitted copy of `template` on each training fold and score it on
/// both the training fold and the held-out fold.
pub fn cross_validate(
    template: &RandomForest,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cv: &CrossValidator,
    scorers: &[Scorer],
) -> Result<CrossValidateOutput> {
    if x.nrows() != y.len() {
        return Err(ForestError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }

    let mut out = CrossValidateOutput::default();
    for split in cv.split(y)? {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let start = Instant::now();
        let mut model = template.unfitted();
        model.fit(&x_train, &y_train)?;
        out.fit_time.push(start.elapsed().as_secs_f64());

        let start = Instant::now();
        for scorer in scorers {
            let train_score = scorer.score(&model, &x_train, &y_train)?;
            let test_score = scorer.score(&model, &x_test, &y_test)?;
            out.train_scores.entry(scorer.name().to_string()).or_default().push(train_score);
            out.test_scores.entry(scorer.name().to_string()).or_default().push(test_score);
        }
        out.score_time.push(start.elapsed().as_secs_f64());

        debug!(fold = split.fold_idx, train = split.train_indices.len(), test = split.test_indices.len(), "fold scored");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::random_forest::ForestParams;
    use ndarray::array;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let y = Array1::zeros(100);
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_k_fold_uneven() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: true }).with_random_state(1);
        let splits = cv.split(&Array1::zeros(10)).unwrap();
        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false });
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn test_stratified_is_deterministic_for_seed() {
        let y = array![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true }).with_random_state(5);
        let a: Vec<Vec<usize>> = cv.split(&y).unwrap().into_iter().map(|s| s.test_indices).collect();
        let b: Vec<Vec<usize>> = cv.split(&y).unwrap().into_iter().map(|s| s.test_indices).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(cv.split(&Array1::zeros(3)).is_err());
    }

    #[test]
    fn test_cross_validate_scores_every_fold() {
        let x = array![
            [0.0], [0.1], [0.2], [0.3], [0.4], [0.5],
            [1.0], [1.1], [1.2], [1.3], [1.4], [1.5]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let template = RandomForest::new(ForestParams {
            n_estimators: 5,
            bootstrap: false,
            ..ForestParams::default()
        });
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true }).with_random_state(0);

        let out = cross_validate(&template, &x, &y, &cv, &[Scorer::Accuracy, Scorer::F1Macro]).unwrap();

        assert_eq!(out.n_folds(), 3);
        assert_eq!(out.train(Scorer::Accuracy).len(), 3);
        assert_eq!(out.test(Scorer::F1Macro).len(), 3);
        assert!(out.test(Scorer::Accuracy).iter().all(|&s| s == 1.0));

        let summary = out.summary();
        assert!(summary.contains_key("train_accuracy"));
        assert!((summary["test_accuracy"].mean_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cv_results_from_scores() {
        let results = CVResults::from_scores(vec![0.5, 1.0]);
        assert_eq!(results.n_folds, 2);
        assert!((results.mean_score - 0.75).abs() < 1e-12);
        assert!((results.std_score - 0.25).abs() < 1e-12);
    }
}
