//! Progress channel: the single choke-point for job state updates.
//!
//! Every state mutation flows through [`ProgressChannel::update`], which
//! (1) merges the delta into the cache entry (the authoritative live view),
//! (2) mirrors it to the durable store best-effort (a failed write-behind is
//! logged, never fatal), and (3) publishes a change ping on the job's topic.
//! Updates for one job are serialized by a per-job async mutex; across jobs
//! no ordering is promised.

use crate::db::repositories::JobRepository;
use crate::db::DatabaseConnection;
use crate::storage::StateCache;
use chrono::Utc;
use dashmap::DashMap;
use domain::{CostBreakdown, JobStatus, Phase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// The live view of one job held in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveState {
    pub status: Option<String>,
    pub progress: u8,
    pub current_phase: Option<String>,
    pub error: Option<String>,
    pub checkpoint_id: Option<String>,
    pub branch: Option<String>,
    pub cost_breakdown: CostBreakdown,
    /// Blob paths of headline artifacts, keyed `kind/key`.
    pub artifact_paths: BTreeMap<String, String>,
    /// Non-fatal warnings (truncation, music fallback).
    pub warnings: Vec<String>,
    pub updated_at: Option<String>,
}

/// Cost accrued by one provider call.
#[derive(Debug, Clone, Copy)]
pub struct CostAdd {
    pub phase: Phase,
    pub usd: f64,
    pub duration_ms: i64,
}

/// One state delta; unset fields leave the current value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProgressDelta {
    pub status: Option<JobStatus>,
    pub percent: Option<u8>,
    pub current_phase: Option<Phase>,
    pub cost_add: Option<CostAdd>,
    pub checkpoint_id: Option<String>,
    pub branch: Option<String>,
    pub error: Option<String>,
    pub artifact_paths: Option<BTreeMap<String, String>>,
    pub warning: Option<String>,
}

impl ProgressDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent);
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.current_phase = Some(phase);
        self
    }

    pub fn with_cost(mut self, cost: CostAdd) -> Self {
        self.cost_add = Some(cost);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_artifact_paths(mut self, paths: BTreeMap<String, String>) -> Self {
        self.artifact_paths = Some(paths);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Dual-sink progress writer: cache first, durable store behind it.
pub struct ProgressChannel {
    db: DatabaseConnection,
    cache: Arc<StateCache>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProgressChannel {
    pub fn new(db: DatabaseConnection, cache: Arc<StateCache>) -> Self {
        Self {
            db,
            cache,
            locks: DashMap::new(),
        }
    }

    fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read the live state from cache, if present and fresh.
    pub fn live_state(&self, job_id: &str) -> Option<LiveState> {
        self.cache
            .get(job_id)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Apply one delta. See the module docs for the write protocol.
    pub async fn update(&self, job_id: &str, delta: ProgressDelta) {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let mut state = self.live_state(job_id).unwrap_or_default();
        Self::merge(&mut state, &delta);
        match serde_json::to_value(&state) {
            Ok(value) => self.cache.put(job_id, value),
            Err(e) => warn!(job_id, error = %e, "Live state serialization failed"),
        }

        self.write_behind(job_id, &delta).await;
        self.cache.publish(job_id);
    }

    /// Merge semantics: last-write-wins per key, except `progress`, which
    /// never moves backwards, and warnings, which accumulate.
    fn merge(state: &mut LiveState, delta: &ProgressDelta) {
        if let Some(status) = delta.status {
            state.status = Some(status.to_string());
        }
        if let Some(percent) = delta.percent {
            state.progress = state.progress.max(percent);
        }
        if let Some(phase) = delta.current_phase {
            state.current_phase = Some(phase.label().to_string());
        }
        if let Some(cost) = delta.cost_add {
            state.cost_breakdown.add(cost.phase, cost.usd);
        }
        if let Some(checkpoint_id) = &delta.checkpoint_id {
            state.checkpoint_id = Some(checkpoint_id.clone());
        }
        if let Some(branch) = &delta.branch {
            state.branch = Some(branch.clone());
        }
        if let Some(error) = &delta.error {
            state.error = Some(error.clone());
        }
        if let Some(paths) = &delta.artifact_paths {
            state.artifact_paths.extend(paths.clone());
        }
        if let Some(warning) = &delta.warning {
            state.warnings.push(warning.clone());
        }
        state.updated_at = Some(Utc::now().to_rfc3339());
    }

    /// Mirror the delta into the durable store; failures are logged only.
    async fn write_behind(&self, job_id: &str, delta: &ProgressDelta) {
        if let Some(status) = delta.status {
            let result = JobRepository::update_status(
                self.db.pool(),
                job_id,
                status,
                delta.percent.map(|p| p as i64),
                delta.current_phase.map(|p| p.label()),
                delta.error.as_deref(),
            )
            .await;
            if let Err(e) = result {
                warn!(job_id, error = %e, "Progress write-behind failed");
            }
        } else if delta.percent.is_some() || delta.error.is_some() {
            // No status change; persist the lighter columns individually.
            let current = JobRepository::get_by_id(self.db.pool(), job_id).await;
            if let Ok(Some(job)) = current {
                let result = JobRepository::update_status(
                    self.db.pool(),
                    job_id,
                    job.job_status(),
                    delta.percent.map(|p| p as i64),
                    delta.current_phase.map(|p| p.label()),
                    delta.error.as_deref(),
                )
                .await;
                if let Err(e) = result {
                    warn!(job_id, error = %e, "Progress write-behind failed");
                }
            }
        }
        if let Some(cost) = delta.cost_add {
            if let Err(e) =
                JobRepository::add_cost(self.db.pool(), job_id, cost.usd, cost.duration_ms).await
            {
                warn!(job_id, error = %e, "Cost write-behind failed");
            }
        }
    }

    /// Drop all channel state for a deleted job.
    pub fn forget(&self, job_id: &str) {
        self.locks.remove(job_id);
        self.cache.remove(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn channel() -> (ProgressChannel, DatabaseConnection) {
        let db = DatabaseConnection::in_memory().await.unwrap();
        let cache = Arc::new(StateCache::with_default_ttl());
        (ProgressChannel::new(db.clone(), cache), db)
    }

    async fn seed_job(db: &DatabaseConnection) {
        crate::db::repositories::JobRepository::create(
            db.pool(),
            crate::db::repositories::job_repo::NewJob {
                id: "job-1".to_string(),
                user_id: "user-1".to_string(),
                title: None,
                prompt: "p".to_string(),
                model_tag: "hailuo_fast".to_string(),
                reference_assets: vec![],
                auto_continue: false,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_update_merges_into_cache_and_db() {
        let (channel, db) = channel().await;
        seed_job(&db).await;

        channel
            .update(
                "job-1",
                ProgressDelta::new()
                    .with_status(JobStatus::Running(Phase::Plan))
                    .with_percent(5)
                    .with_phase(Phase::Plan),
            )
            .await;

        let live = channel.live_state("job-1").unwrap();
        assert_eq!(live.status.as_deref(), Some("running_phase_1"));
        assert_eq!(live.progress, 5);
        assert_eq!(live.current_phase.as_deref(), Some("phase1_plan"));

        let row = JobRepository::get_by_id(db.pool(), "job-1").await.unwrap().unwrap();
        assert_eq!(row.status, "running_phase_1");
        assert_eq!(row.progress, 5);
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let (channel, db) = channel().await;
        seed_job(&db).await;

        channel.update("job-1", ProgressDelta::new().with_percent(35)).await;
        channel.update("job-1", ProgressDelta::new().with_percent(10)).await;
        assert_eq!(channel.live_state("job-1").unwrap().progress, 35);
    }

    #[tokio::test]
    async fn test_independent_keys_commute() {
        let (channel, db) = channel().await;
        seed_job(&db).await;

        channel
            .update("job-1", ProgressDelta::new().with_branch("main"))
            .await;
        channel
            .update("job-1", ProgressDelta::new().with_checkpoint("cp-1"))
            .await;

        let live = channel.live_state("job-1").unwrap();
        assert_eq!(live.branch.as_deref(), Some("main"));
        assert_eq!(live.checkpoint_id.as_deref(), Some("cp-1"));
    }

    #[tokio::test]
    async fn test_cost_add_accumulates_both_sinks() {
        let (channel, db) = channel().await;
        seed_job(&db).await;

        for _ in 0..2 {
            channel
                .update(
                    "job-1",
                    ProgressDelta::new().with_cost(CostAdd {
                        phase: Phase::Storyboard,
                        usd: 0.04,
                        duration_ms: 500,
                    }),
                )
                .await;
        }
        let live = channel.live_state("job-1").unwrap();
        assert!((live.cost_breakdown.0["phase2_storyboard"] - 0.08).abs() < 1e-9);
        let row = JobRepository::get_by_id(db.pool(), "job-1").await.unwrap().unwrap();
        assert!((row.total_cost_usd - 0.08).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_update_publishes_ping() {
        let (channel, db) = channel().await;
        seed_job(&db).await;
        let mut rx = channel.cache.subscribe("job-1");
        channel.update("job-1", ProgressDelta::new().with_percent(1)).await;
        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_warnings_accumulate() {
        let (channel, db) = channel().await;
        seed_job(&db).await;
        channel
            .update("job-1", ProgressDelta::new().with_warning("truncated 1 beat"))
            .await;
        channel
            .update("job-1", ProgressDelta::new().with_warning("music fallback"))
            .await;
        assert_eq!(channel.live_state("job-1").unwrap().warnings.len(), 2);
    }
}
