//! Phase 4: refinement, music generation and the final mux.
//!
//! Music failure has a documented benign fallback: the final video is the
//! stitched video unchanged, with a recorded warning. No other artifact in
//! the pipeline gets this treatment.

use super::context::StageContext;
use super::{Result, StageOutcome};
use crate::checkpoint::ArtifactContent;
use crate::db::models::CheckpointRow;
use crate::db::repositories::JobRepository;
use crate::progress::ProgressDelta;
use domain::{ArtifactKind, Phase};
use providers::MusicRequest;
use std::collections::BTreeMap;
use tracing::warn;

pub async fn run(ctx: &StageContext, source: &CheckpointRow) -> Result<StageOutcome> {
    ctx.check_canceled()?;
    let spec = ctx.spec_from_checkpoint(&source.id).await?;
    let stitched = ctx
        .artifact_bytes(&source.id, ArtifactKind::StitchedVideo, "stitched_video")
        .await?;
    ctx.report_progress(Phase::Refine, 0.1).await;

    let music_style = spec
        .audio
        .music_style
        .clone()
        .unwrap_or_else(|| "instrumental background".to_string());
    let music_provider = ctx.app.providers.music.clone();
    let music_result = music_provider
        .generate(MusicRequest {
            style: music_style,
            duration_s: spec.duration_s,
        })
        .await;

    let (music, final_video) = match music_result {
        Ok(output) => {
            ctx.record_cost(
                Phase::Refine,
                "music",
                music_provider.model_tag(),
                output.cost_usd,
                output.duration,
            )
            .await?;
            ctx.check_canceled()?;
            ctx.report_progress(Phase::Refine, 0.6).await;
            let muxed = ctx.app.media.mux_audio(&stitched, &output.payload).await?;
            (Some((output.payload, output.cost_usd)), muxed)
        }
        Err(e) if ctx.app.config.stage.music_fallback => {
            warn!(job_id = %ctx.job.id, error = %e, "Music generation failed; shipping silent final video");
            ctx.warn(format!("music generation failed ({e}); final video has no music"))
                .await;
            (None, stitched.clone())
        }
        Err(e) => return Err(e.into()),
    };

    ctx.check_canceled()?;
    let checkpoint = ctx
        .store
        .ensure_pending_checkpoint(
            &ctx.job.id,
            &ctx.job.current_branch,
            Phase::Refine,
            Some(&source.id),
        )
        .await?;

    let music_tag = music_provider.model_tag().to_string();
    if let Some((track, cost_usd)) = &music {
        ctx.store
            .put_artifact(
                &checkpoint,
                &ctx.job.user_id,
                ArtifactKind::Music,
                "music",
                ArtifactContent::Blob(track),
                &music_tag,
                *cost_usd,
            )
            .await?;
    }
    let final_row = ctx
        .store
        .put_artifact(
            &checkpoint,
            &ctx.job.user_id,
            ArtifactKind::FinalVideo,
            "final_video",
            ArtifactContent::Blob(&final_video),
            &music_tag,
            0.0,
        )
        .await?;

    if let Some(path) = &final_row.blob_path {
        JobRepository::set_final_video(ctx.app.db.pool(), &ctx.job.id, path).await?;
        let mut paths = BTreeMap::new();
        paths.insert("final_video/final_video".to_string(), path.clone());
        ctx.progress
            .update(&ctx.job.id, ProgressDelta::new().with_artifact_paths(paths))
            .await;
    }

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
