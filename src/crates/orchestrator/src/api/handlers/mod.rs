//! HTTP handlers.

pub mod checkpoints;
pub mod edits;
pub mod health;
pub mod jobs;
pub mod status;

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::db::models::{CheckpointRow, JobRow};
use crate::db::repositories::JobRepository;
use axum::http::HeaderMap;

/// Header the upstream front door sets after authenticating the caller.
pub const USER_HEADER: &str = "x-adforge-user";

/// Resolve the authenticated caller from request headers.
pub fn caller(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_HEADER} header")))
}

/// Load a job and verify the caller owns it.
pub async fn require_owned_job(
    state: &AppState,
    headers: &HeaderMap,
    job_id: &str,
) -> ApiResult<JobRow> {
    let user = caller(headers)?;
    let job = JobRepository::get_by_id(state.pipeline.ctx.db.pool(), job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;
    if job.user_id != user {
        return Err(ApiError::Forbidden("job belongs to another user".into()));
    }
    Ok(job)
}

/// Load a checkpoint, verifying it belongs to the job and is editable:
/// `pending`, with the phase the endpoint covers.
pub async fn require_editable_checkpoint(
    state: &AppState,
    job: &JobRow,
    checkpoint_id: &str,
    phase: domain::Phase,
) -> ApiResult<CheckpointRow> {
    let checkpoint = state.pipeline.store.get(checkpoint_id).await?;
    if checkpoint.job_id != job.id {
        return Err(ApiError::BadRequest(
            "checkpoint does not belong to this job".into(),
        ));
    }
    if checkpoint.checkpoint_status() != crate::db::models::CheckpointStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "checkpoint is {}, not pending",
            checkpoint.checkpoint_status()
        )));
    }
    if checkpoint.phase() != phase {
        return Err(ApiError::BadRequest(format!(
            "endpoint edits {} checkpoints, this one is {}",
            phase.label(),
            checkpoint.phase().label()
        )));
    }
    Ok(checkpoint)
}
