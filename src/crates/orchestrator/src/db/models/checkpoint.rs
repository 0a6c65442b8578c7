//! Checkpoint row model.

use domain::error::DomainError;
use domain::Phase;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Checkpoint lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    /// Awaiting inspection or approval.
    Pending,
    /// The next phase was dispatched from this checkpoint.
    Approved,
    /// Replaced by a newer version or an approved sibling.
    Superseded,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Approved => "approved",
            CheckpointStatus::Superseded => "superseded",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckpointStatus::Pending),
            "approved" => Ok(CheckpointStatus::Approved),
            "superseded" => Ok(CheckpointStatus::Superseded),
            other => Err(DomainError::InvalidValue {
                kind: "checkpoint status",
                value: other.to_string(),
            }),
        }
    }
}

/// One checkpoint: the pause point at the end of a phase, per branch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckpointRow {
    pub id: String,
    pub job_id: String,
    /// Parent checkpoint; None only for branch roots (phase 1).
    pub parent_id: Option<String>,
    pub branch: String,
    /// Phase number 1..=4.
    pub phase: i64,
    /// Version within (job, branch, phase), starting at 1.
    pub version: i64,
    /// Wire-format status.
    pub status: String,
    pub created_at: String,
    pub approved_at: Option<String>,
}

impl CheckpointRow {
    pub fn checkpoint_status(&self) -> CheckpointStatus {
        self.status.parse().unwrap_or(CheckpointStatus::Superseded)
    }

    /// Typed phase; stored value is CHECK-constrained to 1..=4.
    pub fn phase(&self) -> Phase {
        Phase::from_number(self.phase as u8).unwrap_or(Phase::Plan)
    }
}
