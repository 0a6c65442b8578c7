//! Job row model.

use domain::{JobStatus, Phase};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One video generation job.
///
/// # Timestamps
/// All timestamp fields are RFC3339 strings due to SQLite type limitations.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    /// Job identifier (UUID string).
    pub id: String,

    /// Owning user, assigned by the front door.
    pub user_id: String,

    /// Optional ad title.
    pub title: Option<String>,

    /// The natural-language prompt the job was started with.
    pub prompt: String,

    /// Video model tag from the registry.
    pub model_tag: String,

    /// Uploaded reference asset ids, JSON array string.
    pub reference_assets: String,

    /// 1 = advance through checkpoints without pausing.
    pub auto_continue: i64,

    /// Wire-format job status (see `domain::JobStatus`).
    pub status: String,

    /// Percent progress 0..=100.
    pub progress: i64,

    /// Label of the phase currently running or last run.
    pub current_phase: Option<String>,

    /// Error string for failed jobs.
    pub error: Option<String>,

    /// Cumulative provider spend, USD.
    pub total_cost_usd: f64,

    /// Cumulative stage wall-clock, milliseconds.
    pub duration_ms: i64,

    /// Branch the job is currently advancing on.
    pub current_branch: String,

    /// Pending checkpoint id while paused.
    pub current_checkpoint_id: Option<String>,

    /// Blob path of the final video once complete.
    pub final_video_path: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    /// Parse the wire status. A malformed stored status is a data bug;
    /// surfaces as `Failed` rather than panicking.
    pub fn job_status(&self) -> JobStatus {
        self.status.parse().unwrap_or(JobStatus::Failed)
    }

    /// Parsed reference asset ids.
    pub fn reference_asset_ids(&self) -> Vec<String> {
        serde_json::from_str(&self.reference_assets).unwrap_or_default()
    }

    pub fn auto_continue(&self) -> bool {
        self.auto_continue != 0
    }

    /// Phase parsed from the stored label.
    pub fn phase(&self) -> Option<Phase> {
        self.job_status().phase()
    }
}
