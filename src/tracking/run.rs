//! Experiment and run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A named group of runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One logged metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub step: u64,
    pub timestamp: DateTime<Utc>,
}

/// Identity and lifecycle of a run (`meta.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A run with everything logged to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub info: RunInfo,
    pub params: BTreeMap<String, String>,
    /// Full history in logging order
    pub metrics: Vec<Metric>,
    pub tags: BTreeMap<String, String>,
}

impl Run {
    pub fn new(run_id: String, run_name: String, experiment_id: String) -> Self {
        Self {
            info: RunInfo {
                run_id,
                run_name,
                experiment_id,
                status: RunStatus::Running,
                start_time: Utc::now(),
                end_time: None,
            },
            params: BTreeMap::new(),
            metrics: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Most recently logged value of `key`
    pub fn latest_metric(&self, key: &str) -> Option<f64> {
        self.metrics.iter().rev().find(|m| m.key == key).map(|m| m.value)
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.info
            .end_time
            .map(|end| (end - self.info.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_metric_uses_last_value() {
        let mut run = Run::new("r1".into(), "name".into(), "0".into());
        for (step, value) in [(0, 0.5), (1, 0.7)] {
            run.metrics.push(Metric {
                key: "acc".into(),
                value,
                step,
                timestamp: Utc::now(),
            });
        }
        assert_eq!(run.latest_metric("acc"), Some(0.7));
        assert_eq!(run.latest_metric("loss"), None);
        assert!(run.duration_secs().is_none());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Failed).unwrap(), "\"FAILED\"");
        assert!(RunStatus::Finished.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
