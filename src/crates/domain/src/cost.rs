//! Cost accounting types.

use crate::job::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One provider call's cost, recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub phase: Phase,
    /// Capability name, e.g. "planner", "video".
    pub provider: String,
    /// Provider model tag that served the call.
    pub model_tag: String,
    pub usd: f64,
    /// Wall-clock call duration, seconds.
    pub duration_s: f64,
    pub created_at: DateTime<Utc>,
}

/// Per-phase cost totals for the status envelope.
///
/// Keyed by phase label so the JSON form is stable
/// (`{"phase1_plan": 0.03, ...}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostBreakdown(pub BTreeMap<String, f64>);

impl CostBreakdown {
    /// Add an amount to a phase's total.
    pub fn add(&mut self, phase: Phase, usd: f64) {
        *self.0.entry(phase.label().to_string()).or_insert(0.0) += usd;
    }

    /// Sum across phases.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Build from ledger entries.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CostEntry>) -> Self {
        let mut breakdown = CostBreakdown::default();
        for entry in entries {
            breakdown.add(entry.phase, entry.usd);
        }
        breakdown
    }
}
