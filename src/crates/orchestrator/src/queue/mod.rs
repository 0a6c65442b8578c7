//! Stage task queue and per-job cancellation.
//!
//! Delivery is at-least-once: the in-process channel feeds steady-state
//! dispatch, and the orchestrator's startup recovery scan re-enqueues any
//! stage the durable job table shows as running from a crashed process.
//! Stage bodies are idempotent per `(job, phase, source checkpoint)` via
//! the checkpoint store's pending-reuse and artifact version bump, so
//! redelivery is safe. Workers check the job's cancel flag at every
//! suspension point.

use dashmap::DashMap;
use domain::Phase;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One queued stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueTask {
    /// Run one pipeline stage for a job.
    Stage(StageTask),
}

/// The payload of a stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTask {
    pub job_id: String,
    pub phase: Phase,
    /// Checkpoint the stage reads from; None only for phase 1.
    pub source_checkpoint_id: Option<String>,
}

impl StageTask {
    pub fn new(job_id: impl Into<String>, phase: Phase, source: Option<String>) -> Self {
        Self {
            job_id: job_id.into(),
            phase,
            source_checkpoint_id: source,
        }
    }

    /// Idempotency key for deduplication and logging.
    pub fn idempotency_key(&self) -> String {
        format!(
            "stage:{}:{}:{}",
            self.job_id,
            self.phase.number(),
            self.source_checkpoint_id.as_deref().unwrap_or("seed")
        )
    }
}

/// Cooperative cancellation flag for one job.
#[derive(Clone, Default)]
pub struct CancelFlag {
    canceled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Registry of cancel flags, one per job with in-flight work.
#[derive(Default)]
pub struct CancelRegistry {
    flags: DashMap<String, CancelFlag>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The flag for a job, creating a fresh one on first use.
    pub fn flag(&self, job_id: &str) -> CancelFlag {
        self.flags
            .entry(job_id.to_string())
            .or_default()
            .clone()
    }

    /// Request revocation of any in-flight work for the job. Idempotent.
    pub fn cancel(&self, job_id: &str) {
        self.flag(job_id).cancel();
    }

    /// Drop a job's flag (job deleted).
    pub fn forget(&self, job_id: &str) {
        self.flags.remove(job_id);
    }
}

/// In-process work queue feeding the stage worker pool.
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<QueueTask>,
}

impl WorkQueue {
    /// Create the queue; the receiver goes to the worker pool.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a stage task; fails only when the worker pool is gone.
    pub fn enqueue_stage(&self, task: StageTask) -> bool {
        self.tx.send(QueueTask::Stage(task)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_and_idempotent() {
        let registry = CancelRegistry::new();
        let flag = registry.flag("job-1");
        assert!(!flag.is_canceled());
        registry.cancel("job-1");
        registry.cancel("job-1");
        assert!(flag.is_canceled());
        assert!(registry.flag("job-1").is_canceled());
    }

    #[test]
    fn test_forget_resets_flag() {
        let registry = CancelRegistry::new();
        registry.cancel("job-1");
        registry.forget("job-1");
        assert!(!registry.flag("job-1").is_canceled());
    }

    #[tokio::test]
    async fn test_queue_delivers_in_order() {
        let (queue, mut rx) = WorkQueue::new();
        queue.enqueue_stage(StageTask::new("job-1", Phase::Plan, None));
        queue.enqueue_stage(StageTask::new("job-1", Phase::Storyboard, Some("cp-1".into())));

        let QueueTask::Stage(first) = rx.recv().await.unwrap();
        assert_eq!(first.phase, Phase::Plan);
        let QueueTask::Stage(second) = rx.recv().await.unwrap();
        assert_eq!(second.phase, Phase::Storyboard);
        assert_eq!(second.idempotency_key(), "stage:job-1:2:cp-1");
    }
}
