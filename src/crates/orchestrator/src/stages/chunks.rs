//! Phase 3: chunk generation and stitching.
//!
//! Derives the chunk plan, drives the sub-scheduler (parallel groups,
//! sequential continuation chains), then stitches the chunks in index order
//! and registers everything on the phase-3 checkpoint.

use super::context::StageContext;
use super::{Result, StageError, StageOutcome};
use crate::checkpoint::ArtifactContent;
use crate::chunks::{ChunkRenderer, ChunkScheduler, RenderedChunk};
use crate::db::models::CheckpointRow;
use crate::progress::ProgressDelta;
use async_trait::async_trait;
use domain::{ArtifactKind, ChunkPlan, ChunkSlot, ModelRegistry, Phase, VideoSpec};
use providers::VideoRequest;

/// Allowed drift between the stitched container's declared duration and the
/// sum of chunk durations, seconds.
const DURATION_TOLERANCE_S: f64 = 0.5;

struct StageChunkRenderer<'a> {
    ctx: &'a StageContext,
    source_id: &'a str,
    spec: &'a VideoSpec,
    model_tag: String,
}

#[async_trait]
impl ChunkRenderer for StageChunkRenderer<'_> {
    async fn reference_image(&self, beat_index: usize) -> Result<Vec<u8>> {
        self.ctx
            .artifact_bytes(
                self.source_id,
                ArtifactKind::BeatImage,
                &ArtifactKind::BeatImage.indexed_key(beat_index),
            )
            .await
    }

    async fn render(&self, slot: &ChunkSlot, init_image: &[u8]) -> Result<RenderedChunk> {
        self.ctx.check_canceled()?;
        let beat = self.spec.beats.get(slot.beat_index).ok_or_else(|| {
            StageError::Validation(format!("chunk {} references missing beat", slot.index))
        })?;
        let output = self
            .ctx
            .app
            .providers
            .video
            .generate(VideoRequest {
                prompt: beat.prompt.clone(),
                init_image: init_image.to_vec(),
                duration_s: slot.duration_s,
                model_tag: self.model_tag.clone(),
            })
            .await?;
        self.ctx
            .record_cost(
                Phase::Chunks,
                "video",
                &self.model_tag,
                output.cost_usd,
                output.duration,
            )
            .await?;
        Ok(RenderedChunk {
            video: output.payload,
            cost_usd: output.cost_usd,
        })
    }

    async fn extract_last_frame(&self, video: &[u8]) -> Result<Vec<u8>> {
        self.ctx.check_canceled()?;
        Ok(self.ctx.app.media.extract_last_frame(video).await?)
    }

    async fn on_chunk_done(&self, completed: usize, total: usize) {
        self.ctx
            .report_progress(Phase::Chunks, 0.05 + 0.80 * completed as f64 / total.max(1) as f64)
            .await;
    }
}

pub async fn run(ctx: &StageContext, source: &CheckpointRow) -> Result<StageOutcome> {
    ctx.check_canceled()?;
    let spec = ctx.spec_from_checkpoint(&source.id).await?;
    let model = ModelRegistry.require(&ctx.job.model_tag)?;
    let plan = ChunkPlan::derive(&spec, model)?;
    ctx.report_progress(Phase::Chunks, 0.05).await;

    let renderer = StageChunkRenderer {
        ctx,
        source_id: &source.id,
        spec: &spec,
        model_tag: ctx.job.model_tag.clone(),
    };
    let cap = ctx.app.config.stage.chunk_group_fanout;
    let outputs = ChunkScheduler::new(cap).run_groups(&plan, &renderer).await?;

    ctx.check_canceled()?;
    let checkpoint = ctx
        .store
        .ensure_pending_checkpoint(
            &ctx.job.id,
            &ctx.job.current_branch,
            Phase::Chunks,
            Some(&source.id),
        )
        .await?;

    for output in &outputs {
        ctx.store
            .put_artifact(
                &checkpoint,
                &ctx.job.user_id,
                ArtifactKind::Chunk,
                &ArtifactKind::Chunk.indexed_key(output.slot.index),
                ArtifactContent::Blob(&output.video),
                &ctx.job.model_tag,
                output.cost_usd,
            )
            .await?;
        // Group heads with a continuation successor leave their extracted
        // last frame behind for inspection and chunk regeneration.
        if output.slot.kind == domain::ChunkKind::Reference {
            if let Some(frame) = &output.last_frame {
                ctx.store
                    .put_artifact(
                        &checkpoint,
                        &ctx.job.user_id,
                        ArtifactKind::BeatLastFrame,
                        &ArtifactKind::BeatLastFrame.indexed_key(output.slot.beat_index),
                        ArtifactContent::Blob(frame),
                        &ctx.job.model_tag,
                        0.0,
                    )
                    .await?;
            }
        }
    }

    // Deterministic reassembly: index order, never completion order.
    let ordered: Vec<Vec<u8>> = outputs.iter().map(|o| o.video.clone()).collect();
    let stitched = ctx.app.media.stitch(&ordered).await?;

    let expected_s = (plan.total_chunks as u32 * plan.chunk_duration_s) as f64;
    let declared_s = ctx.app.media.probe_duration_s(&stitched).await?;
    if (declared_s - expected_s).abs() > DURATION_TOLERANCE_S {
        return Err(StageError::Validation(format!(
            "stitched duration {declared_s:.2}s differs from expected {expected_s:.2}s"
        )));
    }

    ctx.store
        .put_artifact(
            &checkpoint,
            &ctx.job.user_id,
            ArtifactKind::StitchedVideo,
            "stitched_video",
            ArtifactContent::Blob(&stitched),
            &ctx.job.model_tag,
            0.0,
        )
        .await?;
    // Carry the spec forward so the checkpoint is self-contained for edits
    // and regeneration.
    ctx.store
        .put_artifact(
            &checkpoint,
            &ctx.job.user_id,
            ArtifactKind::Spec,
            "spec",
            ArtifactContent::Json(&spec.to_json()),
            &ctx.job.model_tag,
            0.0,
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
