//! Experiment tracker
//!
//! Holds the active experiment and run, and persists every logged value
//! through a [`StorageBackend`] as soon as it is recorded.

use super::run::{Experiment, Metric, Run, RunInfo, RunStatus};
use super::storage::{LocalStorage, StorageBackend};
use crate::error::{ForestError, Result};
use crate::inference::{ForestClassifierModel, LoggedModel, ModelMetadata, ModelSignature};
use crate::visualization::Figure;
use chrono::Utc;
use parking_lot::RwLock;
use polars::prelude::DataFrame;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_EXPERIMENT: &str = "Default";

/// A model logged to a run
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// `runs:/<run_id>/<artifact_path>`
    pub model_uri: String,
    pub run_id: String,
    /// Directory the model was written to
    pub path: PathBuf,
    pub metadata: ModelMetadata,
}

/// Reject absolute paths and `..` so artifacts stay inside the run
fn check_relative(artifact_path: &str) -> Result<()> {
    let path = Path::new(artifact_path);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if artifact_path.is_empty() || escapes {
        return Err(ForestError::TrackingError(format!(
            "Artifact path '{}' must be relative to the run",
            artifact_path
        )));
    }
    Ok(())
}

/// Experiment tracker
pub struct ExperimentTracker {
    storage: Box<dyn StorageBackend>,
    experiment: RwLock<Option<Experiment>>,
    active_run: RwLock<Option<Run>>,
}

impl std::fmt::Debug for ExperimentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentTracker")
            .field("experiment", &*self.experiment.read())
            .field("active_run", &self.active_run.read().as_ref().map(|r| r.info.run_id.clone()))
            .finish()
    }
}

impl ExperimentTracker {
    pub fn new(storage: Box<dyn StorageBackend>) -> Self {
        Self {
            storage,
            experiment: RwLock::new(None),
            active_run: RwLock::new(None),
        }
    }

    /// Tracker over a local file store rooted at `root`
    pub fn local(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(Box::new(LocalStorage::new(root)?)))
    }

    /// Make `name` the active experiment, creating it if needed
    pub fn set_experiment(&self, name: &str) -> Result<Experiment> {
        let experiment = match self.storage.get_experiment_by_name(name)? {
            Some(existing) => existing,
            None => {
                let created = self.storage.create_experiment(name)?;
                info!(experiment = name, id = %created.experiment_id, "created experiment");
                created
            }
        };
        *self.experiment.write() = Some(experiment.clone());
        Ok(experiment)
    }

    pub fn experiment(&self) -> Option<Experiment> {
        self.experiment.read().clone()
    }

    /// Start a run in the active experiment (the default one if none is set)
    pub fn start_run(&self, run_name: Option<&str>) -> Result<RunInfo> {
        if let Some(active) = self.active_run.read().as_ref() {
            return Err(ForestError::TrackingError(format!(
                "Run {} is already active; end it before starting another",
                active.info.run_id
            )));
        }
        let experiment = match self.experiment() {
            Some(e) => e,
            None => self.set_experiment(DEFAULT_EXPERIMENT)?,
        };

        let run_id = Uuid::new_v4().simple().to_string();
        let run_name = run_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", &run_id[..8]));
        let run = Run::new(run_id, run_name, experiment.experiment_id);
        self.storage.save_run(&run)?;
        info!(run_id = %run.info.run_id, run_name = %run.info.run_name, "started run");

        let info = run.info.clone();
        *self.active_run.write() = Some(run);
        Ok(info)
    }

    pub fn active_run(&self) -> Option<RunInfo> {
        self.active_run.read().as_ref().map(|r| r.info.clone())
    }

    /// Apply `f` to the active run and persist the result
    fn update_run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Run) -> Result<()>,
    {
        let mut guard = self.active_run.write();
        let run = guard
            .as_mut()
            .ok_or_else(|| ForestError::TrackingError("No active run".to_string()))?;
        f(run)?;
        self.storage.save_run(run)
    }

    /// Log a parameter. Re-logging a key with a different value is an error.
    pub fn log_param(&self, key: &str, value: impl ToString) -> Result<()> {
        let value = value.to_string();
        self.update_run(|run| {
            if let Some(existing) = run.params.get(key) {
                if *existing != value {
                    return Err(ForestError::TrackingError(format!(
                        "Param '{}' already logged as '{}', refusing to change it to '{}'",
                        key, existing, value
                    )));
                }
            }
            run.params.insert(key.to_string(), value);
            Ok(())
        })
    }

    pub fn log_params<I, K, V>(&self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        for (key, value) in params {
            self.log_param(key.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn log_metric(&self, key: &str, value: f64, step: u64) -> Result<()> {
        debug!(key, value, step, "log metric");
        self.update_run(|run| {
            run.metrics.push(Metric {
                key: key.to_string(),
                value,
                step,
                timestamp: Utc::now(),
            });
            Ok(())
        })
    }

    pub fn set_tag(&self, key: &str, value: impl ToString) -> Result<()> {
        let value = value.to_string();
        self.update_run(|run| {
            run.tags.insert(key.to_string(), value);
            Ok(())
        })
    }

    /// Artifact directory of the active run
    pub fn artifact_dir(&self) -> Result<PathBuf> {
        let guard = self.active_run.read();
        let run = guard
            .as_ref()
            .ok_or_else(|| ForestError::TrackingError("No active run".to_string()))?;
        Ok(self.storage.artifact_dir(&run.info.experiment_id, &run.info.run_id))
    }

    fn artifact_target(&self, artifact_file: &str) -> Result<PathBuf> {
        check_relative(artifact_file)?;
        let target = self.artifact_dir()?.join(artifact_file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(target)
    }

    /// Copy a local file into the run's artifacts, optionally under a subdirectory
    pub fn log_artifact(&self, local_path: impl AsRef<Path>, artifact_path: Option<&str>) -> Result<PathBuf> {
        let local_path = local_path.as_ref();
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ForestError::TrackingError(format!("Not a file path: {}", local_path.display()))
            })?;
        let relative = match artifact_path {
            Some(dir) => format!("{}/{}", dir.trim_end_matches('/'), file_name),
            None => file_name.to_string(),
        };
        let target = self.artifact_target(&relative)?;
        fs::copy(local_path, &target).map_err(|e| {
            ForestError::TrackingError(format!("Failed to copy {}: {}", local_path.display(), e))
        })?;
        info!(artifact = %relative, "logged artifact");
        Ok(target)
    }

    /// Write `text` as an artifact file
    pub fn log_text(&self, text: &str, artifact_file: &str) -> Result<PathBuf> {
        let target = self.artifact_target(artifact_file)?;
        fs::write(&target, text)?;
        debug!(artifact = artifact_file, "logged text");
        Ok(target)
    }

    /// Render `figure` to SVG and store it as an artifact file
    pub fn log_figure(&self, figure: &Figure, artifact_file: &str) -> Result<PathBuf> {
        let target = self.artifact_target(artifact_file)?;
        figure.save(&target)?;
        info!(artifact = artifact_file, "logged figure");
        Ok(target)
    }

    /// Write a model directory under `artifact_path` in the active run
    pub fn log_model(
        &self,
        model: &ForestClassifierModel,
        artifact_path: &str,
        signature: &ModelSignature,
        input_example: Option<&DataFrame>,
    ) -> Result<ModelInfo> {
        check_relative(artifact_path)?;
        let run_id = self
            .active_run()
            .map(|r| r.run_id)
            .ok_or_else(|| ForestError::TrackingError("No active run".to_string()))?;
        let path = self.artifact_dir()?.join(artifact_path);
        let metadata = LoggedModel::write(&path, model, signature, artifact_path, Some(&run_id), input_example)?;
        let model_uri = format!("runs:/{}/{}", run_id, artifact_path);
        info!(model_uri = %model_uri, "logged model");
        Ok(ModelInfo {
            model_uri,
            run_id,
            path,
            metadata,
        })
    }

    /// Close the active run with `status`
    pub fn end_run(&self, status: RunStatus) -> Result<Run> {
        if !status.is_terminal() {
            return Err(ForestError::TrackingError(format!("Cannot end a run as {}", status)));
        }
        let mut guard = self.active_run.write();
        let mut run = guard
            .take()
            .ok_or_else(|| ForestError::TrackingError("No active run".to_string()))?;
        run.info.status = status;
        run.info.end_time = Some(Utc::now());
        if let Err(e) = self.storage.save_run(&run) {
            *guard = Some(run);
            return Err(e);
        }
        info!(run_id = %run.info.run_id, status = %status, "ended run");
        Ok(run)
    }

    /// Load a finished or active run from storage
    pub fn get_run(&self, experiment_id: &str, run_id: &str) -> Result<Run> {
        self.storage.load_run(experiment_id, run_id)
    }

    pub fn list_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        self.storage.list_runs(experiment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (tempfile::TempDir, ExperimentTracker) {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::local(dir.path()).unwrap();
        (dir, tracker)
    }

    #[test]
    fn test_run_lifecycle() {
        let (_dir, tracker) = tracker();
        tracker.set_experiment("forest").unwrap();
        let info = tracker.start_run(Some("baseline")).unwrap();
        assert_eq!(info.status, RunStatus::Running);
        assert!(tracker.start_run(None).is_err());

        tracker.log_param("n_estimators", 100).unwrap();
        tracker.log_params([("max_depth", "8"), ("criterion", "gini")]).unwrap();
        tracker.log_metric("accuracy", 0.91, 0).unwrap();
        tracker.set_tag("stage", "dev").unwrap();

        let run = tracker.end_run(RunStatus::Finished).unwrap();
        assert_eq!(run.info.status, RunStatus::Finished);
        assert!(run.info.end_time.is_some());
        assert_eq!(run.params.len(), 3);
        assert_eq!(run.latest_metric("accuracy"), Some(0.91));
        assert!(tracker.active_run().is_none());

        let stored = tracker.get_run(&info.experiment_id, &info.run_id).unwrap();
        assert_eq!(stored, run);
    }

    #[test]
    fn test_end_run_requires_terminal_status() {
        let (_dir, tracker) = tracker();
        tracker.set_experiment("forest").unwrap();
        tracker.start_run(None).unwrap();

        assert!(tracker.end_run(RunStatus::Running).is_err());
        assert!(tracker.active_run().is_some());
        assert_eq!(tracker.end_run(RunStatus::Failed).unwrap().info.status, RunStatus::Failed);
    }

    #[test]
    fn test_default_experiment_when_unset() {
        let (_dir, tracker) = tracker();
        tracker.start_run(None).unwrap();
        assert_eq!(tracker.experiment().unwrap().name, DEFAULT_EXPERIMENT);
    }

    #[test]
    fn test_param_cannot_change() {
        let (_dir, tracker) = tracker();
        tracker.start_run(None).unwrap();
        tracker.log_param("seed", 1).unwrap();
        tracker.log_param("seed", 1).unwrap();
        assert!(tracker.log_param("seed", 2).is_err());
    }

    #[test]
    fn test_logging_requires_active_run() {
        let (_dir, tracker) = tracker();
        assert!(tracker.log_metric("m", 1.0, 0).is_err());
        assert!(tracker.end_run(RunStatus::Finished).is_err());
    }

    #[test]
    fn test_artifacts_land_in_run_dir() {
        let (dir, tracker) = tracker();
        let info = tracker.start_run(None).unwrap();

        let local = dir.path().join("model.bin");
        std::fs::write(&local, b"bytes").unwrap();
        let copied = tracker.log_artifact(&local, Some("models")).unwrap();
        let text = tracker.log_text("a,b\n", "tables/fi.csv").unwrap();

        let artifacts = dir
            .path()
            .join(&info.experiment_id)
            .join(&info.run_id)
            .join("artifacts");
        assert_eq!(copied, artifacts.join("models").join("model.bin"));
        assert_eq!(std::fs::read_to_string(text).unwrap(), "a,b\n");
        assert!(tracker.log_text("x", "../escape.txt").is_err());
    }
}
