//! Model registry
//!
//! Registered models live under `<root>/models/<name>/version-<N>.json`,
//! one file per version, numbered from 1.

use crate::error::{ForestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MODELS_DIR: &str = "models";

/// One registered version of a named model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u32,
    /// Where the model was logged, e.g. `runs:/<run_id>/<artifact_path>`
    pub source: String,
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// File-backed registry of named, versioned models
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    /// Open (creating if needed) the registry under a tracking root
    pub fn open(tracking_root: impl AsRef<Path>) -> Result<Self> {
        let root = tracking_root.as_ref().join(MODELS_DIR);
        fs::create_dir_all(&root).map_err(|e| {
            ForestError::TrackingError(format!("Failed to create registry {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    fn model_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ForestError::TrackingError(format!("Invalid model name '{}'", name)));
        }
        Ok(self.root.join(name))
    }

    /// Register a new version of `name`; versions start at 1 and only grow
    pub fn register(&self, name: &str, source: &str, run_id: Option<&str>) -> Result<ModelVersion> {
        let dir = self.model_dir(name)?;
        fs::create_dir_all(&dir)?;
        let version = self.latest_version(name)?.map_or(1, |v| v.version + 1);

        let entry = ModelVersion {
            name: name.to_string(),
            version,
            source: source.to_string(),
            run_id: run_id.map(str::to_string),
            created_at: Utc::now(),
        };
        let path = dir.join(format!("version-{}.json", version));
        // create_new so two writers cannot claim the same number
        let file = File::options().write(true).create_new(true).open(&path).map_err(|e| {
            ForestError::TrackingError(format!("Failed to write {}: {}", path.display(), e))
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), &entry)?;

        info!(model = name, version, source, "registered model version");
        Ok(entry)
    }

    /// All versions of `name`, oldest first; empty for an unknown name
    pub fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let dir = self.model_dir(name)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_version_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("version-") && n.ends_with(".json"));
            if is_version_file {
                let file = File::open(&path)?;
                versions.push(serde_json::from_reader::<_, ModelVersion>(BufReader::new(file))?);
            }
        }
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    pub fn latest_version(&self, name: &str) -> Result<Option<ModelVersion>> {
        Ok(self.list_versions(name)?.pop())
    }

    pub fn get_version(&self, name: &str, version: u32) -> Result<ModelVersion> {
        self.list_versions(name)?
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                ForestError::TrackingError(format!("Model '{}' has no version {}", name, version))
            })
    }

    /// Names of all registered models, sorted
    pub fn list_models(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
