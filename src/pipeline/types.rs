use crate::algorithms::RigidTransform2D;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pipeline step a [`VolumeOutcome`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Listing the volumes of a series
    Discovery,
    Sbi,
    Registration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Sbi => "sbi",
            Stage::Registration => "registration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VolumeStatus {
    Completed { output: PathBuf },
    Skipped { reason: String },
    Failed { error: String },
}

/// What happened to one volume in one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeOutcome {
    pub volume: PathBuf,
    pub stage: Stage,
    #[serde(flatten)]
    pub status: VolumeStatus,
    /// Estimated transform, for completed registrations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<RigidTransform2D>,
}

impl VolumeOutcome {
    pub fn new(volume: &Path, stage: Stage, status: VolumeStatus) -> Self {
        Self {
            volume: volume.to_path_buf(),
            stage,
            status,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: RigidTransform2D) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, VolumeStatus::Completed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, VolumeStatus::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, VolumeStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Per-volume results of a run; failures are collected here instead of aborting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<VolumeOutcome>,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: VolumeOutcome) {
        self.outcomes.push(outcome);
    }

    /// Append another report's outcomes, keeping the earlier start time.
    pub fn merge(&mut self, other: BatchReport) {
        self.started_at = self.started_at.min(other.started_at);
        self.outcomes.extend(other.outcomes);
    }

    pub fn summary(&self) -> BatchSummary {
        self.outcomes
            .iter()
            .fold(BatchSummary::default(), |mut acc, o| {
                match o.status {
                    VolumeStatus::Completed { .. } => acc.completed += 1,
                    VolumeStatus::Skipped { .. } => acc.skipped += 1,
                    VolumeStatus::Failed { .. } => acc.failed += 1,
                }
                acc
            })
    }

    pub fn failures(&self) -> impl Iterator<Item = &VolumeOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn outcomes_for(&self, stage: Stage) -> impl Iterator<Item = &VolumeOutcome> {
        self.outcomes.iter().filter(move |o| o.stage == stage)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            summary: BatchSummary,
            #[serde(flatten)]
            report: &'a BatchReport,
        }

        Ok(serde_json::to_string_pretty(&Document {
            summary: self.summary(),
            report: self,
        })?)
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report {}", path.display()))
    }
}
