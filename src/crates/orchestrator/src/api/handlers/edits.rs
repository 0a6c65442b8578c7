//! Checkpoint edit handlers: spec patches, image replacement, beat and
//! chunk regeneration.
//!
//! Edits are only valid on `pending` checkpoints whose phase matches the
//! endpoint (spec → 1, image → 2, chunk → 3). Every edit bumps the target
//! artifact's version; continuing from an edited checkpoint forks a branch.

use crate::api::error::{ApiError, ApiResult};
use crate::api::handlers::{require_editable_checkpoint, require_owned_job};
use crate::api::models::{
    ArtifactUpdateResponse, EditSpecRequest, EditSpecResponse, RegenerateBeatRequest,
    RegenerateChunkRequest,
};
use crate::api::routes::AppState;
use crate::checkpoint::ArtifactContent;
use crate::db::models::CheckpointRow;
use crate::db::repositories::CostRepository;
use crate::progress::{CostAdd, ProgressDelta};
use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use domain::{ArtifactKind, ChunkKind, ChunkPlan, ModelRegistry, Phase, VideoSpec};
use providers::{ImageRequest, VideoRequest};
use std::time::Duration;
use tracing::info;

/// Load the typed spec artifact from a checkpoint.
async fn spec_on(state: &AppState, checkpoint_id: &str) -> ApiResult<VideoSpec> {
    let artifact = state
        .pipeline
        .store
        .find_artifact(checkpoint_id, ArtifactKind::Spec, "spec")
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("spec artifact on {checkpoint_id}")))?;
    let payload = artifact
        .payload_json()
        .ok_or_else(|| ApiError::InternalError("spec artifact is not inline JSON".into()))?;
    VideoSpec::from_json(payload).map_err(|e| ApiError::InternalError(e.to_string()))
}

/// Record an edit-triggered provider call in both cost sinks, enforcing the
/// per-job spend cap the same way the stage workers do.
async fn record_edit_cost(
    state: &AppState,
    job_id: &str,
    phase: Phase,
    provider: &str,
    model_tag: &str,
    usd: f64,
    duration: Duration,
) -> ApiResult<()> {
    CostRepository::insert(
        state.pipeline.ctx.db.pool(),
        job_id,
        phase.number() as i64,
        provider,
        model_tag,
        usd,
        duration.as_secs_f64(),
    )
    .await?;
    state
        .pipeline
        .progress
        .update(
            job_id,
            ProgressDelta::new().with_cost(CostAdd {
                phase,
                usd,
                duration_ms: duration.as_millis() as i64,
            }),
        )
        .await;

    let total = CostRepository::total_by_job(state.pipeline.ctx.db.pool(), job_id).await?;
    let cap = state.pipeline.ctx.config.stage.spend_cap_usd;
    if total > cap {
        return Err(ApiError::Conflict(format!(
            "spend cap exceeded: {total:.2} USD > {cap:.2} USD"
        )));
    }
    Ok(())
}

/// Edit the phase-1 spec in place.
///
/// PATCH /video/:job/checkpoints/:cp/spec
pub async fn edit_spec(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, checkpoint_id)): Path<(String, String)>,
    Json(request): Json<EditSpecRequest>,
) -> ApiResult<Json<EditSpecResponse>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let checkpoint =
        require_editable_checkpoint(&state, &job, &checkpoint_id, Phase::Plan).await?;

    let mut spec = spec_on(&state, &checkpoint.id).await?;
    if let Some(beats) = request.beats {
        spec.beats = beats;
        // Re-derive offsets and the total; edited durations must still come
        // from the allowed set.
        let mut start = 0u32;
        for (i, beat) in spec.beats.iter_mut().enumerate() {
            beat.index = i;
            beat.start_s = start;
            start += beat.duration_s;
        }
        spec.duration_s = start;
    }
    if let Some(style) = request.style {
        spec.style = style;
    }
    if let Some(product) = request.product {
        spec.product = product;
    }
    if let Some(audio) = request.audio {
        spec.audio = audio;
    }
    spec.validate().map_err(|e| ApiError::ValidationError(e.to_string()))?;

    let row = state
        .pipeline
        .store
        .put_artifact(
            &checkpoint,
            &job.user_id,
            ArtifactKind::Spec,
            "spec",
            ArtifactContent::Json(&spec.to_json()),
            "user-edit",
            0.0,
        )
        .await?;
    info!(job_id = %job.id, checkpoint = %checkpoint.id, version = row.version, "Spec edited");
    Ok(Json(EditSpecResponse {
        artifact_id: row.id,
        version: row.version,
    }))
}

/// Replace one beat's storyboard image with an upload.
///
/// POST /video/:job/checkpoints/:cp/upload-image (multipart)
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, checkpoint_id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> ApiResult<Json<ArtifactUpdateResponse>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let checkpoint =
        require_editable_checkpoint(&state, &job, &checkpoint_id, Phase::Storyboard).await?;

    let mut beat_index: Option<usize> = None;
    let mut image: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart: {e}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("beat_index") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("beat_index: {e}")))?;
                beat_index = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ApiError::BadRequest("beat_index must be an integer".into()))?,
                );
            }
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("image: {e}")))?;
                image = Some(bytes.to_vec());
            }
            _ => {}
        }
    }
    let beat_index =
        beat_index.ok_or_else(|| ApiError::BadRequest("missing beat_index field".into()))?;
    let image = image.ok_or_else(|| ApiError::BadRequest("missing image file".into()))?;

    replace_beat_image(&state, &job.user_id, &job.id, &checkpoint, beat_index, &image, "user-upload")
        .await
}

/// Regenerate one beat's storyboard image with the image provider.
///
/// POST /video/:job/checkpoints/:cp/regenerate-beat
pub async fn regenerate_beat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, checkpoint_id)): Path<(String, String)>,
    Json(request): Json<RegenerateBeatRequest>,
) -> ApiResult<Json<ArtifactUpdateResponse>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let checkpoint =
        require_editable_checkpoint(&state, &job, &checkpoint_id, Phase::Storyboard).await?;

    let spec = spec_on(&state, &checkpoint.id).await?;
    let beat = spec
        .beats
        .get(request.beat_index)
        .ok_or_else(|| ApiError::BadRequest(format!("no beat {}", request.beat_index)))?;
    let prompt = request.prompt_override.unwrap_or_else(|| beat.prompt.clone());

    let image_provider = state.pipeline.ctx.providers.image.clone();
    let output = image_provider
        .generate(ImageRequest {
            prompt,
            style_hint: spec.style.mood.clone(),
        })
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    record_edit_cost(
        &state,
        &job.id,
        Phase::Storyboard,
        "image",
        image_provider.model_tag(),
        output.cost_usd,
        output.duration,
    )
    .await?;

    replace_beat_image(
        &state,
        &job.user_id,
        &job.id,
        &checkpoint,
        request.beat_index,
        &output.payload,
        image_provider.model_tag(),
    )
    .await
}

/// Shared tail of the two image-replacement paths: bump the image artifact
/// and rewrite the spec's `image_url` for that beat.
async fn replace_beat_image(
    state: &AppState,
    user_id: &str,
    job_id: &str,
    checkpoint: &CheckpointRow,
    beat_index: usize,
    image: &[u8],
    provider_tag: &str,
) -> ApiResult<Json<ArtifactUpdateResponse>> {
    let mut spec = spec_on(state, &checkpoint.id).await?;
    if beat_index >= spec.beats.len() {
        return Err(ApiError::BadRequest(format!("no beat {beat_index}")));
    }

    let row = state
        .pipeline
        .store
        .put_artifact(
            checkpoint,
            user_id,
            ArtifactKind::BeatImage,
            &ArtifactKind::BeatImage.indexed_key(beat_index),
            ArtifactContent::Blob(image),
            provider_tag,
            0.0,
        )
        .await?;
    let path = row
        .blob_path
        .clone()
        .ok_or_else(|| ApiError::InternalError("beat image missing blob path".into()))?;

    spec.beats[beat_index].image_url = Some(path.clone());
    state
        .pipeline
        .store
        .put_artifact(
            checkpoint,
            user_id,
            ArtifactKind::Spec,
            "spec",
            ArtifactContent::Json(&spec.to_json()),
            provider_tag,
            0.0,
        )
        .await?;

    info!(job_id, checkpoint = %checkpoint.id, beat_index, version = row.version,
          "Beat image replaced");
    Ok(Json(ArtifactUpdateResponse {
        artifact_id: row.id,
        s3_url: state.pipeline.ctx.signer.sign(&path, Utc::now()),
        version: row.version,
    }))
}

/// Regenerate one chunk, then re-stitch.
///
/// POST /video/:job/checkpoints/:cp/regenerate-chunk
pub async fn regenerate_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, checkpoint_id)): Path<(String, String)>,
    Json(request): Json<RegenerateChunkRequest>,
) -> ApiResult<Json<ArtifactUpdateResponse>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let checkpoint =
        require_editable_checkpoint(&state, &job, &checkpoint_id, Phase::Chunks).await?;

    let model_tag = match request.model_override {
        Some(tag) => {
            ModelRegistry
                .require(&tag)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            tag
        }
        None => job.model_tag.clone(),
    };

    // The plan is derived with the job's own model so chunk indices match
    // what phase 3 produced; the override only changes the generation call.
    let spec = spec_on(&state, &checkpoint.id).await?;
    let job_model = ModelRegistry
        .require(&job.model_tag)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    let plan = ChunkPlan::derive(&spec, job_model)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    let slot = plan
        .slot(request.chunk_index)
        .ok_or_else(|| ApiError::BadRequest(format!("no chunk {}", request.chunk_index)))?;
    let beat = spec
        .beats
        .get(slot.beat_index)
        .ok_or_else(|| ApiError::InternalError("chunk references missing beat".into()))?;

    let init_image = chunk_init_image(&state, &checkpoint, slot.kind, slot.beat_index).await?;
    let output = state
        .pipeline
        .ctx
        .providers
        .video
        .generate(VideoRequest {
            prompt: beat.prompt.clone(),
            init_image,
            duration_s: slot.duration_s,
            model_tag: model_tag.clone(),
        })
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    record_edit_cost(
        &state,
        &job.id,
        Phase::Chunks,
        "video",
        &model_tag,
        output.cost_usd,
        output.duration,
    )
    .await?;

    let row = state
        .pipeline
        .store
        .put_artifact(
            &checkpoint,
            &job.user_id,
            ArtifactKind::Chunk,
            &ArtifactKind::Chunk.indexed_key(request.chunk_index),
            ArtifactContent::Blob(&output.payload),
            &model_tag,
            output.cost_usd,
        )
        .await?;
    let path = row
        .blob_path
        .clone()
        .ok_or_else(|| ApiError::InternalError("chunk missing blob path".into()))?;

    restitch(&state, &job.user_id, &checkpoint, plan.total_chunks).await?;

    info!(job_id = %job.id, chunk = request.chunk_index, model = %model_tag,
          version = row.version, "Chunk regenerated");
    Ok(Json(ArtifactUpdateResponse {
        artifact_id: row.id,
        s3_url: state.pipeline.ctx.signer.sign(&path, Utc::now()),
        version: row.version,
    }))
}

/// Init image for a regenerated chunk: the beat's storyboard image for
/// reference chunks, the stored group-head last frame for continuations
/// (falling back to the storyboard image).
async fn chunk_init_image(
    state: &AppState,
    checkpoint: &CheckpointRow,
    kind: ChunkKind,
    beat_index: usize,
) -> ApiResult<Vec<u8>> {
    if kind == ChunkKind::Continuation {
        if let Some(frame) = state
            .pipeline
            .store
            .find_artifact(
                &checkpoint.id,
                ArtifactKind::BeatLastFrame,
                &ArtifactKind::BeatLastFrame.indexed_key(beat_index),
            )
            .await?
        {
            if let Some(path) = frame.blob_path {
                return state
                    .pipeline
                    .ctx
                    .blob
                    .get(&path)
                    .await
                    .map_err(|e| ApiError::InternalError(e.to_string()));
            }
        }
    }

    // The storyboard images live on the parent (phase-2) checkpoint.
    let parent_id = checkpoint
        .parent_id
        .as_deref()
        .ok_or_else(|| ApiError::InternalError("phase-3 checkpoint has no parent".into()))?;
    let image = state
        .pipeline
        .store
        .find_artifact(
            parent_id,
            ArtifactKind::BeatImage,
            &ArtifactKind::BeatImage.indexed_key(beat_index),
        )
        .await?
        .ok_or_else(|| {
            ApiError::InternalError(format!("no storyboard image for beat {beat_index}"))
        })?;
    let path = image
        .blob_path
        .ok_or_else(|| ApiError::InternalError("storyboard image missing blob path".into()))?;
    state
        .pipeline
        .ctx
        .blob
        .get(&path)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))
}

/// Rebuild the stitched video from the checkpoint's chunks in index order.
async fn restitch(
    state: &AppState,
    user_id: &str,
    checkpoint: &CheckpointRow,
    total_chunks: usize,
) -> ApiResult<()> {
    let mut chunks = Vec::with_capacity(total_chunks);
    for index in 0..total_chunks {
        let row = state
            .pipeline
            .store
            .find_artifact(
                &checkpoint.id,
                ArtifactKind::Chunk,
                &ArtifactKind::Chunk.indexed_key(index),
            )
            .await?
            .ok_or_else(|| ApiError::InternalError(format!("missing chunk {index}")))?;
        let path = row
            .blob_path
            .ok_or_else(|| ApiError::InternalError(format!("chunk {index} has no blob")))?;
        let bytes = state
            .pipeline
            .ctx
            .blob
            .get(&path)
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        chunks.push(bytes);
    }
    let stitched = state
        .pipeline
        .ctx
        .media
        .stitch(&chunks)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    state
        .pipeline
        .store
        .put_artifact(
            checkpoint,
            user_id,
            ArtifactKind::StitchedVideo,
            "stitched_video",
            ArtifactContent::Blob(&stitched),
            "restitch",
            0.0,
        )
        .await?;
    Ok(())
}
