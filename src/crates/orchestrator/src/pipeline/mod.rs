//! Pipeline orchestrator: job lifecycle and stage dispatch.
//!
//! The orchestrator is stateless; its state lives in the metadata store and
//! the progress channel. It dispatches exactly one stage at a time per job,
//! pauses at checkpoints (or auto-advances while still recording them),
//! forks a child branch when continuing from an edited checkpoint, and never
//! partially advances state: either a phase's checkpoint exists or it does
//! not.

use crate::checkpoint::{CheckpointStore, StoreError};
use crate::context::AppContext;
use crate::db::models::{CheckpointRow, CheckpointStatus, JobRow};
use crate::db::repositories::job_repo::NewJob;
use crate::db::repositories::JobRepository;
use crate::progress::{ProgressChannel, ProgressDelta};
use crate::queue::{CancelRegistry, QueueTask, StageTask, WorkQueue};
use crate::stages::{run_stage, StageContext, StageError, StageOutcome};
use domain::{JobStatus, ModelRegistry, Phase};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Checkpoint store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Inputs for starting a new job.
pub struct StartRequest {
    pub user_id: String,
    pub prompt: String,
    pub title: Option<String>,
    pub model_tag: Option<String>,
    pub reference_assets: Vec<String>,
    pub auto_continue: bool,
}

/// What `continue` reports back to the caller.
#[derive(Debug, Clone)]
pub struct ContinueOutcome {
    /// The phase dispatched next; None when the job completed.
    pub next_phase: Option<Phase>,
    pub branch: String,
    pub created_new_branch: bool,
}

/// The pipeline orchestrator.
pub struct Pipeline {
    pub ctx: AppContext,
    pub progress: Arc<ProgressChannel>,
    pub store: Arc<CheckpointStore>,
    queue: WorkQueue,
    cancels: Arc<CancelRegistry>,
}

impl Pipeline {
    /// Build the orchestrator; the returned receiver feeds
    /// [`Pipeline::spawn_workers`].
    pub fn new(ctx: AppContext) -> (Arc<Self>, mpsc::UnboundedReceiver<QueueTask>) {
        let progress = Arc::new(ProgressChannel::new(ctx.db.clone(), ctx.cache.clone()));
        let store = Arc::new(CheckpointStore::new(ctx.db.clone(), ctx.blob.clone()));
        let (queue, rx) = WorkQueue::new();
        (
            Arc::new(Self {
                ctx,
                progress,
                store,
                queue,
                cancels: Arc::new(CancelRegistry::new()),
            }),
            rx,
        )
    }

    /// Spawn the stage worker pool over the queue receiver.
    pub fn spawn_workers(
        self: &Arc<Self>,
        rx: mpsc::UnboundedReceiver<QueueTask>,
        count: usize,
    ) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));
        (0..count.max(1))
            .map(|worker| {
                let pipeline = self.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let task = { rx.lock().await.recv().await };
                        match task {
                            Some(QueueTask::Stage(task)) => pipeline.process_task(task).await,
                            None => {
                                info!(worker, "Stage worker shutting down");
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Seed a job and dispatch phase 1.
    pub async fn start(&self, request: StartRequest) -> Result<JobRow> {
        let model_tag = request
            .model_tag
            .unwrap_or_else(|| domain::model_registry::DEFAULT_MODEL_TAG.to_string());
        ModelRegistry
            .require(&model_tag)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        if request.prompt.trim().is_empty() {
            return Err(PipelineError::Validation("prompt must not be empty".into()));
        }

        let job = JobRepository::create(
            self.ctx.db.pool(),
            NewJob {
                id: Uuid::new_v4().to_string(),
                user_id: request.user_id,
                title: request.title,
                prompt: request.prompt,
                model_tag,
                reference_assets: request.reference_assets,
                auto_continue: request.auto_continue,
            },
        )
        .await?;
        info!(job_id = %job.id, "Job created");

        self.dispatch_phase(&job, Phase::Plan, None).await?;
        Ok(job)
    }

    /// Approve a pending checkpoint and dispatch the next phase (or complete
    /// the job after phase 4). Branches when the checkpoint was edited.
    pub async fn continue_job(&self, job_id: &str, checkpoint_id: &str) -> Result<ContinueOutcome> {
        let job = self.require_job(job_id).await?;
        let checkpoint = self
            .store
            .get(checkpoint_id)
            .await
            .map_err(|_| PipelineError::NotFound(format!("checkpoint {checkpoint_id}")))?;
        if checkpoint.job_id != job.id {
            return Err(PipelineError::Validation(
                "checkpoint does not belong to this job".into(),
            ));
        }
        if checkpoint.checkpoint_status() != CheckpointStatus::Pending {
            return Err(PipelineError::Conflict(format!(
                "checkpoint is {}, not pending",
                checkpoint.checkpoint_status()
            )));
        }
        let expected = JobStatus::PausedAt(checkpoint.phase());
        if job.job_status() != expected
            || job.current_checkpoint_id.as_deref() != Some(checkpoint_id)
        {
            return Err(PipelineError::Conflict(
                "job is not paused at this checkpoint".into(),
            ));
        }

        self.approve_and_advance(&job, &checkpoint).await
    }

    /// Shared continue path: approve, pick the branch, dispatch or complete.
    async fn approve_and_advance(
        &self,
        job: &JobRow,
        checkpoint: &CheckpointRow,
    ) -> Result<ContinueOutcome> {
        let edited = self.store.has_been_edited(&checkpoint.id).await?;
        self.store.approve(&checkpoint.id).await?;

        let phase = checkpoint.phase();
        let Some(next_phase) = phase.next() else {
            // Phase 4: approval completes the job.
            self.complete_job(job).await?;
            return Ok(ContinueOutcome {
                next_phase: None,
                branch: checkpoint.branch.clone(),
                created_new_branch: false,
            });
        };

        let (branch, created_new_branch) = if edited {
            let child = self
                .store
                .allocate_child_branch(&job.id, &checkpoint.branch)
                .await?;
            info!(job_id = %job.id, parent = %checkpoint.branch, child = %child,
                  "Edited checkpoint; forking branch");
            (child, true)
        } else {
            (checkpoint.branch.clone(), false)
        };

        // The approved checkpoint stays recorded as the job's position while
        // the next stage runs: it is the dispatch source a crash-recovery
        // scan needs to re-enqueue the stage.
        JobRepository::set_position(self.ctx.db.pool(), &job.id, &branch, Some(&checkpoint.id))
            .await?;
        self.progress
            .update(&job.id, ProgressDelta::new().with_branch(branch.clone()))
            .await;

        let mut job = job.clone();
        job.current_branch = branch.clone();
        self.dispatch_phase(&job, next_phase, Some(checkpoint.id.clone()))
            .await?;

        Ok(ContinueOutcome {
            next_phase: Some(next_phase),
            branch,
            created_new_branch,
        })
    }

    /// Re-enqueue stages for jobs the durable store shows as running: a
    /// previous process crashed between dispatch and checkpoint. Stage
    /// bodies are idempotent per (job, phase, source checkpoint), so
    /// redelivery is safe. Returns the number of stages re-enqueued.
    pub async fn recover_interrupted_jobs(&self) -> Result<usize> {
        let interrupted = JobRepository::list_running(self.ctx.db.pool()).await?;
        let mut requeued = 0;
        for job in interrupted {
            let Some(phase) = job.phase() else { continue };
            // The job row keeps pointing at the dispatch-source checkpoint
            // while a stage runs; None only for phase 1.
            let task = StageTask::new(&job.id, phase, job.current_checkpoint_id.clone());
            warn!(job_id = %job.id, phase = %phase, "Re-enqueueing stage interrupted by restart");
            if self.queue.enqueue_stage(task) {
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    /// Request cancellation; idempotent, and a no-op on complete/failed jobs.
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        let job = self.require_job(job_id).await?;
        let status = job.job_status();
        if !status.can_transition_to(&JobStatus::Canceled) {
            return Ok(());
        }
        self.cancels.cancel(job_id);
        self.progress
            .update(job_id, ProgressDelta::new().with_status(JobStatus::Canceled))
            .await;
        info!(job_id, "Job canceled");
        Ok(())
    }

    /// Delete a job: blobs, rows, live state.
    pub async fn delete(&self, job_id: &str) -> Result<()> {
        let job = self.require_job(job_id).await?;
        self.cancels.cancel(job_id);
        let prefix = format!("{}/videos/{}", job.user_id, job.id);
        if let Err(e) = self.ctx.blob.delete_prefix(&prefix).await {
            warn!(job_id, error = %e, "Blob cleanup failed during delete");
        }
        JobRepository::delete(self.ctx.db.pool(), job_id).await?;
        self.progress.forget(job_id);
        self.cancels.forget(job_id);
        info!(job_id, "Job deleted");
        Ok(())
    }

    /// The single mutation primitive: mark the job running and enqueue
    /// exactly one stage task.
    async fn dispatch_phase(
        &self,
        job: &JobRow,
        phase: Phase,
        source_checkpoint_id: Option<String>,
    ) -> Result<()> {
        if matches!(job.job_status(), JobStatus::Running(_)) {
            return Err(PipelineError::Conflict(format!(
                "job {} already has a stage in flight",
                job.id
            )));
        }
        self.progress
            .update(
                &job.id,
                ProgressDelta::new()
                    .with_status(JobStatus::Running(phase))
                    .with_phase(phase)
                    .with_percent(phase.start_percent()),
            )
            .await;
        let task = StageTask::new(&job.id, phase, source_checkpoint_id);
        info!(key = %task.idempotency_key(), "Dispatching stage");
        if !self.queue.enqueue_stage(task) {
            return Err(PipelineError::Conflict("worker pool is shut down".into()));
        }
        Ok(())
    }

    /// Worker entry point for one stage task.
    pub async fn process_task(&self, task: StageTask) {
        let job = match JobRepository::get_by_id(self.ctx.db.pool(), &task.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %task.job_id, "Stage task for missing job dropped");
                return;
            }
            Err(e) => {
                error!(job_id = %task.job_id, error = %e, "Failed to load job for stage task");
                return;
            }
        };
        if job.job_status().is_terminal() {
            info!(job_id = %job.id, "Dropping stage task for terminal job");
            return;
        }

        let source = match &task.source_checkpoint_id {
            Some(id) => match self.store.get(id).await {
                Ok(cp) => Some(cp),
                Err(e) => {
                    self.fail_job(&job.id, task.phase, &format!("source checkpoint: {e}")).await;
                    return;
                }
            },
            None => None,
        };

        let stage_ctx = StageContext {
            app: self.ctx.clone(),
            progress: self.progress.clone(),
            store: self.store.clone(),
            cancel: self.cancels.flag(&job.id),
            job: job.clone(),
        };

        let budget = self.ctx.config.stage.phase_budget(task.phase);
        let result = tokio::time::timeout(
            budget,
            run_stage(&stage_ctx, task.phase, source.as_ref()),
        )
        .await
        .unwrap_or(Err(StageError::Timeout));

        match result {
            Ok(outcome) => self.on_stage_complete(&job, task.phase, outcome).await,
            Err(e) if e.is_cancellation() => {
                self.progress
                    .update(&job.id, ProgressDelta::new().with_status(JobStatus::Canceled))
                    .await;
                info!(job_id = %job.id, phase = %task.phase, "Stage abandoned after cancel");
            }
            Err(e) => self.fail_job(&job.id, task.phase, &e.to_string()).await,
        }
    }

    /// Stage finished: record the pause, then auto-advance if configured.
    async fn on_stage_complete(&self, job: &JobRow, phase: Phase, outcome: StageOutcome) {
        let checkpoint = outcome.checkpoint;
        self.progress
            .update(
                &job.id,
                ProgressDelta::new()
                    .with_status(JobStatus::PausedAt(phase))
                    .with_percent(phase.completion_percent())
                    .with_checkpoint(checkpoint.id.clone())
                    .with_branch(checkpoint.branch.clone()),
            )
            .await;
        if let Err(e) = JobRepository::set_position(
            self.ctx.db.pool(),
            &job.id,
            &checkpoint.branch,
            Some(&checkpoint.id),
        )
        .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to record pause position");
        }
        info!(job_id = %job.id, phase = %phase, checkpoint = %checkpoint.id, "Phase checkpointed");

        if job.auto_continue() {
            // Reload: the pause transition above changed the row.
            let fresh = match JobRepository::get_by_id(self.ctx.db.pool(), &job.id).await {
                Ok(Some(fresh)) => fresh,
                _ => return,
            };
            if let Err(e) = self.approve_and_advance(&fresh, &checkpoint).await {
                error!(job_id = %job.id, error = %e, "Auto-advance failed");
                self.fail_job(&job.id, phase, &format!("auto-advance: {e}")).await;
            }
        }
    }

    /// Terminal completion after phase 4 approval.
    async fn complete_job(&self, job: &JobRow) -> Result<()> {
        self.progress
            .update(
                &job.id,
                ProgressDelta::new()
                    .with_status(JobStatus::Complete)
                    .with_percent(100),
            )
            .await;
        JobRepository::set_position(self.ctx.db.pool(), &job.id, &job.current_branch, None).await?;
        info!(job_id = %job.id, "Job complete");
        Ok(())
    }

    /// Terminal failure: record the error and the failing phase.
    async fn fail_job(&self, job_id: &str, phase: Phase, message: &str) {
        error!(job_id, phase = %phase, error = message, "Stage failed");
        self.progress
            .update(
                job_id,
                ProgressDelta::new()
                    .with_status(JobStatus::Failed)
                    .with_phase(phase)
                    .with_error(message),
            )
            .await;
    }

    async fn require_job(&self, job_id: &str) -> Result<JobRow> {
        JobRepository::get_by_id(self.ctx.db.pool(), job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("job {job_id}")))
    }
}
