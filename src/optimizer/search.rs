//! Randomized hyperparameter search with cross-validated scoring

use super::search_space::{Candidate, ParamDistributions};
use crate::error::{ForestError, Result};
use crate::training::cross_validation::{cross_validate, CrossValidator};
use crate::training::metrics::Scorer;
use crate::training::random_forest::{ForestParams, RandomForest};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of one evaluated candidate. A candidate that cannot be applied
/// or fitted is kept as a failed trial with NaN scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub candidate: Candidate,
    /// `None` when the candidate is not a valid parameter set
    pub params: Option<ForestParams>,
    pub mean_test_score: f64,
    pub std_test_score: f64,
    pub mean_fit_time: f64,
    pub error: Option<String>,
}

impl TrialResult {
    fn failed(candidate: Candidate, params: Option<ForestParams>, error: &ForestError) -> Self {
        Self {
            candidate,
            params,
            mean_test_score: f64::NAN,
            std_test_score: f64::NAN,
            mean_fit_time: 0.0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Best candidate and the full trial table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub best_params: ForestParams,
    pub best_score: f64,
    pub best_index: usize,
    pub scorer: Scorer,
    pub trials: Vec<TrialResult>,
}

/// Samples up to `n_iter` distinct candidates and scores each by
/// cross-validation on the refit scorer.
pub struct RandomizedSearch {
    distributions: ParamDistributions,
    base: ForestParams,
    n_iter: usize,
    cv: CrossValidator,
    scorer: Scorer,
    random_state: Option<u64>,
}

impl RandomizedSearch {
    pub fn new(
        distributions: ParamDistributions,
        base: ForestParams,
        cv: CrossValidator,
        scorer: Scorer,
    ) -> Self {
        Self {
            distributions,
            base,
            n_iter: 10,
            cv,
            scorer,
            random_state: None,
        }
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// The grid in order when it has at most `n_iter` points, otherwise
    /// `n_iter` distinct points drawn without replacement.
    pub fn sample_candidates(&self) -> Vec<Candidate> {
        let grid = self.distributions.grid_size();
        if grid <= self.n_iter {
            return (0..grid).map(|i| self.distributions.candidate(i)).collect();
        }
        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        sample(&mut rng, grid, self.n_iter)
            .into_iter()
            .map(|i| self.distributions.candidate(i))
            .collect()
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        let candidates = self.sample_candidates();
        if candidates.is_empty() {
            return Err(ForestError::ConfigError("Search space has no candidates".to_string()));
        }
        info!(
            n_candidates = candidates.len(),
            grid_size = self.distributions.grid_size(),
            scorer = %self.scorer,
            "starting randomized search"
        );

        let mut trials = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let params = match candidate.apply(&self.base) {
                Ok(params) => params,
                Err(e) => {
                    warn!(trial = i, candidate = ?candidate, error = %e, "candidate skipped");
                    trials.push(TrialResult::failed(*candidate, None, &e));
                    continue;
                }
            };
            let start = Instant::now();
            match self.score(&params, x, y) {
                Ok((mean_test_score, std_test_score, mean_fit_time)) => {
                    info!(
                        trial = i,
                        n_estimators = params.n_estimators,
                        max_depth = ?params.max_depth,
                        min_samples_split = %params.min_samples_split,
                        min_samples_leaf = params.min_samples_leaf,
                        score = mean_test_score,
                        elapsed = ?start.elapsed(),
                        "candidate scored"
                    );
                    trials.push(TrialResult {
                        candidate: *candidate,
                        params: Some(params),
                        mean_test_score,
                        std_test_score,
                        mean_fit_time,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(trial = i, error = %e, "candidate failed to fit");
                    trials.push(TrialResult::failed(*candidate, Some(params), &e));
                }
            }
        }

        // First best wins ties; failed trials never win
        let mut best: Option<(usize, &ForestParams)> = None;
        for (i, trial) in trials.iter().enumerate() {
            let Some(params) = trial.params.as_ref().filter(|_| !trial.is_failed()) else {
                continue;
            };
            if best.map_or(true, |(b, _)| trial.mean_test_score > trials[b].mean_test_score) {
                best = Some((i, params));
            }
        }
        let Some((best_index, best_params)) = best else {
            let last = trials.iter().rev().find_map(|t| t.error.clone()).unwrap_or_default();
            return Err(ForestError::TrainingError(format!(
                "All {} search candidates failed; last error: {}",
                trials.len(),
                last
            )));
        };
        let best_params = best_params.clone();
        let best_score = trials[best_index].mean_test_score;

        if trials.iter().any(TrialResult::is_failed) {
            warn!(
                failed = trials.iter().filter(|t| t.is_failed()).count(),
                total = trials.len(),
                "some search candidates failed"
            );
        }

        Ok(SearchResult {
            best_params,
            best_score,
            best_index,
            scorer: self.scorer,
            trials,
        })
    }

    /// Mean and std of the held-out score, and mean fit time, over the folds
    fn score(&self, params: &ForestParams, x: &Array2<f64>, y: &Array1<f64>) -> Result<(f64, f64, f64)> {
        let cv_out = cross_validate(&RandomForest::new(params.clone()), x, y, &self.cv, &[self.scorer])?;
        let summary = cv_out.summary();
        let test = summary
            .get(&format!("test_{}", self.scorer.name()))
            .ok_or_else(|| ForestError::TrainingError("Missing test scores".to_string()))?;
        let mean_fit_time = cv_out.fit_time.iter().sum::<f64>() / cv_out.n_folds().max(1) as f64;
        Ok((test.mean_score, test.std_score, mean_fit_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::cross_validation::CVStrategy;
    use ndarray::array;

    fn distributions() -> ParamDistributions {
        ParamDistributions {
            n_estimators: vec![3.0, 6.0],
            max_depth: Some(vec![1.0, 2.0, 3.0]),
            min_samples_split: vec![2.0],
            min_samples_leaf: vec![1.0, 2.0],
        }
    }

    fn cv() -> CrossValidator {
        CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 2, shuffle: true }).with_random_state(0)
    }

    #[test]
    fn test_full_grid_when_small() {
        let search = RandomizedSearch::new(distributions(), ForestParams::default(), cv(), Scorer::Accuracy)
            .with_n_iter(50);
        assert_eq!(search.sample_candidates().len(), 12);
    }

    #[test]
    fn test_sampling_is_distinct_and_seeded() {
        let search = RandomizedSearch::new(distributions(), ForestParams::default(), cv(), Scorer::Accuracy)
            .with_n_iter(5)
            .with_random_state(11);
        let a = search.sample_candidates();
        let b = search.sample_candidates();
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
        for i in 0..a.len() {
            for j in (i + 1)..a.len() {
                assert_ne!(a[i], a[j]);
            }
        }
    }

    #[test]
    fn test_fit_picks_best_trial() {
        let x = array![[0.0], [0.2], [0.4], [0.6], [1.0], [1.2], [1.4], [1.6]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

        let search = RandomizedSearch::new(distributions(), ForestParams::default(), cv(), Scorer::Accuracy)
            .with_n_iter(4)
            .with_random_state(0);
        let result = search.fit(&x, &y).unwrap();

        assert_eq!(result.trials.len(), 4);
        let max = result
            .trials
            .iter()
            .map(|t| t.mean_test_score)
            .fold(f64::MIN, f64::max);
        assert_eq!(result.best_score, max);
        assert_eq!(Some(&result.best_params), result.trials[result.best_index].params.as_ref());
    }

    #[test]
    fn test_invalid_candidates_become_failed_trials() {
        let x = array![[0.0], [0.2], [0.4], [0.6], [1.0], [1.2], [1.4], [1.6]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let dist = ParamDistributions {
            n_estimators: vec![4.0],
            max_depth: None,
            min_samples_split: vec![2.0, 2.5, 3.0],
            min_samples_leaf: vec![1.0],
        };

        let search = RandomizedSearch::new(dist, ForestParams::default(), cv(), Scorer::Accuracy).with_n_iter(10);
        let result = search.fit(&x, &y).unwrap();

        assert_eq!(result.trials.len(), 3);
        let failed = &result.trials[1];
        assert!(failed.is_failed());
        assert!(failed.params.is_none());
        assert!(failed.mean_test_score.is_nan());
        assert!(failed.error.as_deref().unwrap().contains("min_samples_split"));
        assert_ne!(result.best_index, 1);
        assert!(!result.best_score.is_nan());
    }

    #[test]
    fn test_all_candidates_failing_is_an_error() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let dist = ParamDistributions {
            n_estimators: vec![4.0],
            max_depth: None,
            min_samples_split: vec![2.5, 3.5],
            min_samples_leaf: vec![1.0],
        };

        let search = RandomizedSearch::new(dist, ForestParams::default(), cv(), Scorer::Accuracy);
        let err = search.fit(&x, &y).unwrap_err();
        assert!(matches!(err, ForestError::TrainingError(_)));
        assert!(err.to_string().contains("All 2 search candidates failed"));
    }
}
