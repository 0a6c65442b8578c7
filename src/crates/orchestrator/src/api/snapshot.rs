//! Status envelope assembly.
//!
//! The snapshot merges the cache's live view (authoritative while the job
//! runs) with the durable store (authoritative after termination), then
//! substitutes signed URLs for every blob reference.

use crate::api::error::ApiResult;
use crate::api::models::{
    ArtifactView, BranchView, CheckpointView, CurrentCheckpointView, StatusEnvelope, TreeView,
};
use crate::db::models::{ArtifactRow, CheckpointRow, CheckpointStatus, JobRow};
use crate::db::repositories::CostRepository;
use crate::pipeline::Pipeline;
use chrono::Utc;
use domain::{ArtifactKind, CostBreakdown, Phase};
use std::collections::BTreeMap;

/// Sign an artifact's blob path, if it has one.
pub fn artifact_view(pipeline: &Pipeline, row: &ArtifactRow) -> ArtifactView {
    let url = row
        .blob_path
        .as_deref()
        .map(|path| pipeline.ctx.signer.sign(path, Utc::now()));
    ArtifactView {
        id: row.id.clone(),
        kind: row.kind.clone(),
        key: row.key.clone(),
        version: row.version,
        url,
        payload: row.payload_json(),
        provider_tag: row.provider_tag.clone(),
        cost_usd: row.cost_usd,
    }
}

/// Signed URLs for one kind on a checkpoint, ordered by key.
async fn kind_urls(
    pipeline: &Pipeline,
    checkpoint_id: &str,
    kind: ArtifactKind,
) -> ApiResult<Vec<String>> {
    let artifacts = pipeline.store.artifacts(checkpoint_id).await?;
    let mut rows: Vec<&ArtifactRow> = artifacts
        .iter()
        .filter(|a| a.kind == kind.as_str() && a.blob_path.is_some())
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(rows
        .iter()
        .filter_map(|a| a.blob_path.as_deref())
        .map(|path| pipeline.ctx.signer.sign(path, Utc::now()))
        .collect())
}

/// Latest non-superseded checkpoint of a phase on a branch.
fn latest_of_phase<'a>(
    checkpoints: &'a [CheckpointRow],
    phase: Phase,
) -> Option<&'a CheckpointRow> {
    checkpoints
        .iter()
        .filter(|c| {
            c.phase == phase.number() as i64
                && c.checkpoint_status() != CheckpointStatus::Superseded
        })
        .max_by_key(|c| c.version)
}

/// Build the full status envelope for a job.
pub async fn build(pipeline: &Pipeline, job: &JobRow) -> ApiResult<StatusEnvelope> {
    let live = pipeline.progress.live_state(&job.id);

    let status = live
        .as_ref()
        .and_then(|l| l.status.clone())
        .unwrap_or_else(|| job.status.clone());
    let progress = live
        .as_ref()
        .map(|l| l.progress)
        .unwrap_or(job.progress as u8);
    let current_phase = live
        .as_ref()
        .and_then(|l| l.current_phase.clone())
        .or_else(|| job.current_phase.clone());
    let error = live
        .as_ref()
        .and_then(|l| l.error.clone())
        .or_else(|| job.error.clone());
    let warnings = live.as_ref().map(|l| l.warnings.clone()).unwrap_or_default();

    let entries = CostRepository::list_by_job(pipeline.ctx.db.pool(), &job.id).await?;
    let cost_entries: Vec<_> = entries.iter().filter_map(|row| row.to_entry()).collect();
    let cost_breakdown = CostBreakdown::from_entries(&cost_entries);

    let branch_checkpoints = pipeline.store.list(&job.id, Some(&job.current_branch)).await?;

    let storyboard_urls = match latest_of_phase(&branch_checkpoints, Phase::Storyboard) {
        Some(cp) => {
            let urls = kind_urls(pipeline, &cp.id, ArtifactKind::BeatImage).await?;
            (!urls.is_empty()).then_some(urls)
        }
        None => None,
    };
    let (chunk_urls, stitched_video_url) = match latest_of_phase(&branch_checkpoints, Phase::Chunks)
    {
        Some(cp) => {
            let chunks = kind_urls(pipeline, &cp.id, ArtifactKind::Chunk).await?;
            let stitched = kind_urls(pipeline, &cp.id, ArtifactKind::StitchedVideo)
                .await?
                .into_iter()
                .next();
            ((!chunks.is_empty()).then_some(chunks), stitched)
        }
        None => (None, None),
    };
    let final_video_url = job
        .final_video_path
        .as_deref()
        .map(|path| pipeline.ctx.signer.sign(path, Utc::now()));

    let current_checkpoint = match &job.current_checkpoint_id {
        Some(cp_id) => {
            let cp = pipeline.store.get(cp_id).await?;
            let artifacts = pipeline.store.artifacts(cp_id).await?;
            let mut views = BTreeMap::new();
            for row in &artifacts {
                views.insert(
                    format!("{}/{}", row.kind, row.key),
                    artifact_view(pipeline, row),
                );
            }
            Some(CurrentCheckpointView {
                id: cp.id.clone(),
                branch: cp.branch.clone(),
                phase: cp.phase as u8,
                version: cp.version,
                status: cp.status.clone(),
                artifacts: views,
            })
        }
        None => None,
    };

    let forest = pipeline.store.tree(&job.id).await?;
    let checkpoint_tree: Vec<TreeView> = forest.iter().map(TreeView::from_node).collect();

    let mut active_branches = Vec::new();
    for name in pipeline.store.branches(&job.id).await? {
        if let Some(latest) = pipeline.store.latest_on_branch(&job.id, &name).await? {
            active_branches.push(BranchView {
                name,
                latest_checkpoint_id: latest.id.clone(),
                phase: latest.phase as u8,
                can_continue: latest.checkpoint_status() == CheckpointStatus::Pending,
            });
        }
    }

    Ok(StatusEnvelope {
        video_id: job.id.clone(),
        status,
        progress,
        current_phase,
        error,
        cost_usd: cost_breakdown.total(),
        cost_breakdown,
        warnings,
        storyboard_urls,
        chunk_urls,
        stitched_video_url,
        final_video_url,
        current_checkpoint,
        checkpoint_tree: (!checkpoint_tree.is_empty()).then_some(checkpoint_tree),
        active_branches: (!active_branches.is_empty()).then_some(active_branches),
    })
}

/// Checkpoint views for a list response.
pub fn checkpoint_views(rows: &[CheckpointRow]) -> Vec<CheckpointView> {
    rows.iter().map(CheckpointView::from_row).collect()
}
