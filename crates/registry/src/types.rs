//! Training runs, registry entries and the persisted registry state.

use chrono::{DateTime, Utc};
use dataset::DatasetStats;
use models::{Metrics, TrainParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(RunId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One training attempt. Never deleted; immutable once finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub id: RunId,
    pub family: String,
    pub params: TrainParams,
    pub dataset_stats: DatasetStats,
    pub metrics: Metrics,
    /// Reason the evaluation is unreliable, if it is
    pub degraded: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Serialized model bundle, set on completion
    pub artifact: Option<PathBuf>,
    pub failure: Option<String>,
}

impl TrainingRun {
    pub fn new(params: TrainParams, dataset_stats: DatasetStats) -> Self {
        Self {
            id: RunId::new(),
            family: params.family.clone(),
            params,
            dataset_stats,
            metrics: Metrics::new(),
            degraded: None,
            status: RunStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            artifact: None,
            failure: None,
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// The comparison values a run was promoted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub primary_metric: String,
    pub primary_value: f64,
    pub secondary_metric: Option<String>,
    pub secondary_value: Option<f64>,
}

/// A promoted run. At most one entry per family is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistryEntry {
    pub version: u32,
    pub run_id: RunId,
    pub family: String,
    pub is_active: bool,
    pub promoted_at: DateTime<Utc>,
    pub metric_snapshot: MetricSnapshot,
    pub degraded: bool,
}

/// Everything the registry persists, versioned by `generation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    pub generation: u64,
    pub runs: Vec<TrainingRun>,
    pub entries: Vec<ModelRegistryEntry>,
}

impl RegistryState {
    pub fn run(&self, id: RunId) -> Option<&TrainingRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn run_mut(&mut self, id: RunId) -> Option<&mut TrainingRun> {
        self.runs.iter_mut().find(|r| r.id == id)
    }

    pub fn active_entry(&self, family: &str) -> Option<&ModelRegistryEntry> {
        self.entries.iter().find(|e| e.family == family && e.is_active)
    }

    pub fn active_run(&self, family: &str) -> Option<&TrainingRun> {
        self.active_entry(family).and_then(|e| self.run(e.run_id))
    }

    /// Completed runs of one family, oldest first.
    pub fn completed_runs<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a TrainingRun> + 'a {
        self.runs
            .iter()
            .filter(move |r| r.family == family && r.is_completed())
    }

    /// Make `run_id` the only active entry of its family.
    ///
    /// Reuses the run's existing entry when it was promoted before, otherwise
    /// appends one with the next version number.
    pub fn activate(&mut self, run_id: RunId, family: &str, snapshot: MetricSnapshot, degraded: bool) -> u32 {
        for entry in self.entries.iter_mut().filter(|e| e.family == family) {
            entry.is_active = false;
        }

        let now = Utc::now();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.run_id == run_id) {
            entry.is_active = true;
            entry.promoted_at = now;
            entry.metric_snapshot = snapshot;
            entry.degraded = degraded;
            return entry.version;
        }

        let version = self
            .entries
            .iter()
            .filter(|e| e.family == family)
            .map(|e| e.version)
            .max()
            .unwrap_or(0)
            + 1;
        self.entries.push(ModelRegistryEntry {
            version,
            run_id,
            family: family.to_string(),
            is_active: true,
            promoted_at: now,
            metric_snapshot: snapshot,
            degraded,
        });
        version
    }
}
