//! Job lifecycle handlers: generate, detail, list, continue, cancel, delete.

use crate::api::error::ApiResult;
use crate::api::handlers::{caller, require_owned_job};
use crate::api::models::{
    ContinueRequest, ContinueResponse, GenerateRequest, GenerateResponse, VideoDetailResponse,
};
use crate::api::routes::AppState;
use crate::db::repositories::JobRepository;
use crate::pipeline::StartRequest;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;

/// Start a new job.
///
/// POST /generate
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let user_id = caller(&headers)?;
    let job = state
        .pipeline
        .start(StartRequest {
            user_id,
            prompt: request.prompt,
            title: request.title,
            model_tag: request.model,
            reference_assets: request.reference_assets,
            auto_continue: request.auto_continue,
        })
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            video_id: job.id,
            status: "queued".to_string(),
        }),
    ))
}

/// Full job record with final URLs.
///
/// GET /video/:job
pub async fn get_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<VideoDetailResponse>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let final_video_url = job
        .final_video_path
        .as_deref()
        .map(|path| state.pipeline.ctx.signer.sign(path, Utc::now()));
    Ok(Json(VideoDetailResponse {
        video_id: job.id.clone(),
        title: job.title.clone(),
        prompt: job.prompt.clone(),
        model: job.model_tag.clone(),
        auto_continue: job.auto_continue(),
        status: job.status.clone(),
        progress: job.progress as u8,
        error: job.error.clone(),
        cost_usd: job.total_cost_usd,
        duration_ms: job.duration_ms,
        current_branch: job.current_branch.clone(),
        final_video_url,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}

/// The caller's jobs, newest first.
///
/// GET /videos
pub async fn list_videos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<GenerateResponse>>> {
    let user_id = caller(&headers)?;
    let jobs = JobRepository::list_by_user(state.pipeline.ctx.db.pool(), &user_id).await?;
    Ok(Json(
        jobs.into_iter()
            .map(|job| GenerateResponse {
                video_id: job.id,
                status: job.status,
            })
            .collect(),
    ))
}

/// Approve a pending checkpoint and dispatch the next phase.
///
/// POST /video/:job/continue
pub async fn continue_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(request): Json<ContinueRequest>,
) -> ApiResult<Json<ContinueResponse>> {
    require_owned_job(&state, &headers, &job_id).await?;
    let outcome = state
        .pipeline
        .continue_job(&job_id, &request.checkpoint_id)
        .await?;
    Ok(Json(ContinueResponse {
        next_phase: outcome.next_phase.map(|p| p.number()),
        branch_name: outcome.branch,
        created_new_branch: outcome.created_new_branch,
    }))
}

/// Cancel a job; idempotent.
///
/// POST /video/:job/cancel
pub async fn cancel_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    require_owned_job(&state, &headers, &job_id).await?;
    state.pipeline.cancel(&job_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Delete a job with all its blobs and rows.
///
/// DELETE /video/:job
pub async fn delete_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    require_owned_job(&state, &headers, &job_id).await?;
    state.pipeline.delete(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
