//! Phase 2: storyboard.
//!
//! One image per beat, generated in parallel under the fan-out cap. The
//! stage writes each image as a `beat_image` artifact and carries a new spec
//! artifact forward with `beats[i].image_url` filled in.

use super::context::StageContext;
use super::{Result, StageError, StageOutcome};
use crate::checkpoint::ArtifactContent;
use crate::db::models::CheckpointRow;
use crate::progress::ProgressDelta;
use domain::{ArtifactKind, Phase};
use futures::future::join_all;
use providers::ImageRequest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub async fn run(ctx: &StageContext, source: &CheckpointRow) -> Result<StageOutcome> {
    ctx.check_canceled()?;
    let mut spec = ctx.spec_from_checkpoint(&source.id).await?;
    let beat_count = spec.beats.len();
    ctx.report_progress(Phase::Storyboard, 0.05).await;

    let cap = beat_count.min(ctx.app.config.stage.storyboard_fanout).max(1);
    let semaphore = Arc::new(Semaphore::new(cap));
    let completed = Arc::new(AtomicUsize::new(0));

    let style_hint = spec.style.mood.clone().or_else(|| spec.style.palette.clone());
    let image_futures = spec.beats.iter().map(|beat| {
        let semaphore = semaphore.clone();
        let completed = completed.clone();
        let style_hint = style_hint.clone();
        let prompt = beat.prompt.clone();
        let index = beat.index;
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("storyboard semaphore closed");
            ctx.check_canceled()?;
            let output = ctx
                .app
                .providers
                .image
                .generate(ImageRequest { prompt, style_hint })
                .await?;
            ctx.record_cost(
                Phase::Storyboard,
                "image",
                ctx.app.providers.image.model_tag(),
                output.cost_usd,
                output.duration,
            )
            .await?;
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.report_progress(Phase::Storyboard, 0.05 + 0.8 * done as f64 / beat_count as f64)
                .await;
            Ok::<_, StageError>((index, output.payload, output.cost_usd))
        }
    });

    let mut images: Vec<(usize, Vec<u8>, f64)> = Vec::with_capacity(beat_count);
    for result in join_all(image_futures).await {
        images.push(result?);
    }
    images.sort_by_key(|(index, _, _)| *index);

    // Mandatory artifact count: one image per beat.
    if images.len() != beat_count {
        return Err(StageError::Validation(format!(
            "storyboard produced {} images for {} beats",
            images.len(),
            beat_count
        )));
    }

    ctx.check_canceled()?;
    let checkpoint = ctx
        .store
        .ensure_pending_checkpoint(
            &ctx.job.id,
            &ctx.job.current_branch,
            Phase::Storyboard,
            Some(&source.id),
        )
        .await?;

    let image_tag = ctx.app.providers.image.model_tag().to_string();
    for (index, bytes, cost_usd) in &images {
        let row = ctx
            .store
            .put_artifact(
                &checkpoint,
                &ctx.job.user_id,
                ArtifactKind::BeatImage,
                &ArtifactKind::BeatImage.indexed_key(*index),
                ArtifactContent::Blob(bytes),
                &image_tag,
                *cost_usd,
            )
            .await?;
        // The spec carries the canonical blob path; signed URLs are derived
        // at read time so they never go stale at rest.
        if let Some(path) = row.blob_path {
            spec.beats[*index].image_url = Some(path);
        }
    }

    if !spec.storyboard_complete() {
        return Err(StageError::Validation(
            "storyboard left beats without image URLs".to_string(),
        ));
    }

    ctx.store
        .put_artifact(
            &checkpoint,
            &ctx.job.user_id,
            ArtifactKind::Spec,
            "spec",
            ArtifactContent::Json(&spec.to_json()),
            &image_tag,
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
