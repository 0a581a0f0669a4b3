//! Storage backends for experiment tracking
//!
//! The local store lays runs out as
//! `<root>/<experiment_id>/meta.json` and
//! `<root>/<experiment_id>/<run_id>/{meta,params,metrics,tags}.json`
//! with artifacts under `<root>/<experiment_id>/<run_id>/artifacts/`.

use super::run::{Experiment, Run};
use crate::error::{ForestError, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub const META_FILE: &str = "meta.json";
pub const PARAMS_FILE: &str = "params.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const TAGS_FILE: &str = "tags.json";
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Where experiments, runs and artifacts are persisted
pub trait StorageBackend: Send + Sync {
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>>;

    fn create_experiment(&self, name: &str) -> Result<Experiment>;

    /// Write the full state of `run`
    fn save_run(&self, run: &Run) -> Result<()>;

    fn load_run(&self, experiment_id: &str, run_id: &str) -> Result<Run>;

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<Run>>;

    /// Directory artifacts of a run are written to
    fn artifact_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf;
}

/// Local file system storage backend
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        ForestError::TrackingError(format!("Failed to create {}: {}", path.display(), e))
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        ForestError::TrackingError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            ForestError::TrackingError(format!("Failed to create {}: {}", base_dir.display(), e))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.base_dir.join(experiment_id)
    }

    fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment_id).join(run_id)
    }

    /// Every experiment with a readable `meta.json`, ordered by id
    pub fn list_experiments(&self) -> Result<Vec<Experiment>> {
        let mut experiments = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let meta = entry?.path().join(META_FILE);
            if meta.is_file() {
                experiments.push(read_json::<Experiment>(&meta)?);
            }
        }
        experiments.sort_by_key(|e| e.experiment_id.parse::<u64>().unwrap_or(u64::MAX));
        Ok(experiments)
    }
}

impl StorageBackend for LocalStorage {
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self.list_experiments()?.into_iter().find(|e| e.name == name))
    }

    fn create_experiment(&self, name: &str) -> Result<Experiment> {
        if self.get_experiment_by_name(name)?.is_some() {
            return Err(ForestError::TrackingError(format!(
                "Experiment '{}' already exists",
                name
            )));
        }
        let next_id = self
            .list_experiments()?
            .iter()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(0, |id| id + 1);

        let experiment = Experiment {
            experiment_id: next_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let dir = self.experiment_dir(&experiment.experiment_id);
        fs::create_dir_all(&dir)?;
        write_json(&dir.join(META_FILE), &experiment)?;
        Ok(experiment)
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        let dir = self.run_dir(&run.info.experiment_id, &run.info.run_id);
        fs::create_dir_all(dir.join(ARTIFACTS_DIR))?;
        write_json(&dir.join(META_FILE), &run.info)?;
        write_json(&dir.join(PARAMS_FILE), &run.params)?;
        write_json(&dir.join(METRICS_FILE), &run.metrics)?;
        write_json(&dir.join(TAGS_FILE), &run.tags)?;
        Ok(())
    }

    fn load_run(&self, experiment_id: &str, run_id: &str) -> Result<Run> {
        let dir = self.run_dir(experiment_id, run_id);
        if !dir.join(META_FILE).is_file() {
            return Err(ForestError::TrackingError(format!(
                "Run {} not found in experiment {}",
                run_id, experiment_id
            )));
        }
        Ok(Run {
            info: read_json(&dir.join(META_FILE))?,
            params: read_json(&dir.join(PARAMS_FILE))?,
            metrics: read_json(&dir.join(METRICS_FILE))?,
            tags: read_json(&dir.join(TAGS_FILE))?,
        })
    }

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        let dir = self.experiment_dir(experiment_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() && path.join(META_FILE).is_file() {
                if let Some(run_id) = path.file_name().and_then(|n| n.to_str()) {
                    runs.push(self.load_run(experiment_id, run_id)?);
                }
            }
        }
        runs.sort_by_key(|r| r.info.start_time);
        Ok(runs)
    }

    fn artifact_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.run_dir(experiment_id, run_id).join(ARTIFACTS_DIR)
    }
}
