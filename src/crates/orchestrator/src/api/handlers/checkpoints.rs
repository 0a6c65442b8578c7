//! Checkpoint read handlers: lists, details, tree, branches.

use crate::api::error::{ApiError, ApiResult};
use crate::api::handlers::require_owned_job;
use crate::api::models::{
    BranchView, CheckpointDetailResponse, CheckpointListResponse, CheckpointView, TreeView,
};
use crate::api::routes::AppState;
use crate::api::snapshot;
use crate::db::models::CheckpointStatus;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub branch: Option<String>,
}

/// List checkpoints (optionally per branch) plus the tree.
///
/// GET /video/:job/checkpoints
pub async fn list_checkpoints(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<CheckpointListResponse>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let rows = state
        .pipeline
        .store
        .list(&job.id, query.branch.as_deref())
        .await?;
    let forest = state.pipeline.store.tree(&job.id).await?;
    Ok(Json(CheckpointListResponse {
        checkpoints: snapshot::checkpoint_views(&rows),
        tree: forest.iter().map(TreeView::from_node).collect(),
    }))
}

/// One checkpoint with its artifacts, blob references signed.
///
/// GET /video/:job/checkpoints/:cp
pub async fn checkpoint_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, checkpoint_id)): Path<(String, String)>,
) -> ApiResult<Json<CheckpointDetailResponse>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let checkpoint = state.pipeline.store.get(&checkpoint_id).await?;
    if checkpoint.job_id != job.id {
        return Err(ApiError::NotFound(format!("checkpoint {checkpoint_id}")));
    }
    let artifacts = state.pipeline.store.artifacts(&checkpoint_id).await?;
    Ok(Json(CheckpointDetailResponse {
        checkpoint: CheckpointView::from_row(&checkpoint),
        artifacts: artifacts
            .iter()
            .map(|row| snapshot::artifact_view(&state.pipeline, row))
            .collect(),
    }))
}

/// The job's current pending checkpoint, if paused.
///
/// GET /video/:job/checkpoints/current
pub async fn current_checkpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    match &job.current_checkpoint_id {
        Some(checkpoint_id) => {
            let checkpoint = state.pipeline.store.get(checkpoint_id).await?;
            Ok(Json(json!({
                "checkpoint": CheckpointView::from_row(&checkpoint)
            })))
        }
        None => Ok(Json(json!({ "checkpoint": null }))),
    }
}

/// The checkpoint forest.
///
/// GET /video/:job/checkpoints/tree
pub async fn checkpoint_tree(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let forest = state.pipeline.store.tree(&job.id).await?;
    let tree: Vec<TreeView> = forest.iter().map(TreeView::from_node).collect();
    Ok(Json(json!({ "tree": tree })))
}

/// Active branches with their latest checkpoints.
///
/// GET /video/:job/branches
pub async fn branches(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let mut views = Vec::new();
    for name in state.pipeline.store.branches(&job.id).await? {
        if let Some(latest) = state.pipeline.store.latest_on_branch(&job.id, &name).await? {
            views.push(BranchView {
                name,
                latest_checkpoint_id: latest.id.clone(),
                phase: latest.phase as u8,
                can_continue: latest.checkpoint_status() == CheckpointStatus::Pending,
            });
        }
    }
    Ok(Json(json!({ "branches": views })))
}
