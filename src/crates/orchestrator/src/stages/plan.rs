//! Phase 1: planning.
//!
//! One planner call produces the spec JSON. Validation: beats overrunning
//! the declared duration are truncated with a recorded warning; a beat
//! duration outside {5, 10, 15} is fatal.

use super::context::StageContext;
use super::{Result, StageError, StageOutcome};
use crate::checkpoint::ArtifactContent;
use crate::progress::ProgressDelta;
use domain::{ArtifactKind, Phase, VideoSpec};
use providers::PlanRequest;
use tracing::info;

/// Target video length handed to the planner; the returned spec's own
/// `duration_s` governs from then on.
const DEFAULT_DURATION_S: u32 = 30;

pub async fn run(ctx: &StageContext) -> Result<StageOutcome> {
    ctx.check_canceled()?;
    ctx.report_progress(Phase::Plan, 0.1).await;

    let request = PlanRequest {
        prompt: ctx.job.prompt.clone(),
        title: ctx.job.title.clone(),
        duration_s: DEFAULT_DURATION_S,
        reference_assets: ctx.job.reference_asset_ids(),
    };
    let planner = ctx.app.providers.planner.clone();
    let output = planner.plan(request).await?;
    ctx.record_cost(
        Phase::Plan,
        "planner",
        planner.model_tag(),
        output.cost_usd,
        output.duration,
    )
    .await?;
    ctx.check_canceled()?;

    let spec = VideoSpec::from_json(output.payload)
        .map_err(|e| StageError::Validation(format!("planner spec: {e}")))?;
    let normalized = spec.normalize()?;
    if normalized.truncated_beats > 0 {
        info!(
            job_id = %ctx.job.id,
            truncated = normalized.truncated_beats,
            "Planner overran the video duration; truncated tail beats"
        );
        ctx.warn(format!(
            "planner overran duration; truncated {} tail beat(s)",
            normalized.truncated_beats
        ))
        .await;
    }

    ctx.report_progress(Phase::Plan, 0.8).await;
    let checkpoint = ctx
        .store
        .ensure_pending_checkpoint(&ctx.job.id, &ctx.job.current_branch, Phase::Plan, None)
        .await?;
    ctx.store
        .put_artifact(
            &checkpoint,
            &ctx.job.user_id,
            ArtifactKind::Spec,
            "spec",
            ArtifactContent::Json(&normalized.spec.to_json()),
            planner.model_tag(),
            output.cost_usd,
        )
        .await?;

    ctx.progress
        .update(
            &ctx.job.id,
            ProgressDelta::new()
                .with_checkpoint(checkpoint.id.clone())
                .with_branch(checkpoint.branch.clone()),
        )
        .await;

    Ok(StageOutcome { checkpoint })
}
