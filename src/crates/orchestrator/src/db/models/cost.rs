//! Cost ledger row model.

use domain::{CostEntry, Phase};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One provider call's cost.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CostRow {
    pub id: String,
    pub job_id: String,
    /// Phase number 1..=4.
    pub phase: i64,
    /// Capability name: planner, image, video, music.
    pub provider: String,
    pub model_tag: String,
    pub usd: f64,
    pub duration_s: f64,
    pub created_at: String,
}

impl CostRow {
    /// Convert to the domain cost entry.
    pub fn to_entry(&self) -> Option<CostEntry> {
        Some(CostEntry {
            phase: Phase::from_number(self.phase as u8)?,
            provider: self.provider.clone(),
            model_tag: self.model_tag.clone(),
            usd: self.usd,
            duration_s: self.duration_s,
            created_at: self.created_at.parse().ok()?,
        })
    }
}
