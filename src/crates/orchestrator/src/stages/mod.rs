//! Stage workers: the four idempotent phase bodies.
//!
//! Every stage follows the same skeleton: read the source checkpoint's
//! artifacts (or the seed inputs for phase 1), call capabilities, upload
//! blob outputs, create the phase checkpoint with its artifacts, and report
//! progress. Idempotence comes from the checkpoint store: re-running a stage
//! on the same source checkpoint reuses the pending checkpoint and bumps
//! artifact versions instead of duplicating rows.

pub mod chunks;
pub mod context;
pub mod plan;
pub mod refine;
pub mod storyboard;

pub use context::StageContext;

use crate::checkpoint::StoreError;
use crate::db::models::CheckpointRow;
use crate::media::MediaError;
use domain::error::DomainError;
use domain::Phase;
use providers::ProviderError;
use thiserror::Error;

/// Errors that terminate a stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Cooperative cancellation observed at a suspension point.
    #[error("Stage canceled")]
    Canceled,

    /// The stage exceeded its wall-clock budget.
    #[error("Stage timed out")]
    Timeout,

    /// A stage-level contract violation (bad spec, missing artifact).
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl StageError {
    /// True when the stage ended because of cancellation, not failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StageError::Canceled)
    }
}

/// Result type for stage bodies.
pub type Result<T> = std::result::Result<T, StageError>;

/// What a completed stage hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// The checkpoint created at the end of the phase.
    pub checkpoint: CheckpointRow,
}

/// Run one stage body.
pub async fn run_stage(
    ctx: &StageContext,
    phase: Phase,
    source: Option<&CheckpointRow>,
) -> Result<StageOutcome> {
    match phase {
        Phase::Plan => plan::run(ctx).await,
        Phase::Storyboard => {
            let source = require_source(source, phase)?;
            storyboard::run(ctx, source).await
        }
        Phase::Chunks => {
            let source = require_source(source, phase)?;
            chunks::run(ctx, source).await
        }
        Phase::Refine => {
            let source = require_source(source, phase)?;
            refine::run(ctx, source).await
        }
    }
}

fn require_source<'a>(
    source: Option<&'a CheckpointRow>,
    phase: Phase,
) -> Result<&'a CheckpointRow> {
    source.ok_or_else(|| {
        StageError::Validation(format!("{} dispatched without a source checkpoint", phase.label()))
    })
}
