//! Status snapshot and the live event stream.

use crate::api::error::ApiResult;
use crate::api::handlers::require_owned_job;
use crate::api::models::{CheckpointCreatedEvent, StatusEnvelope};
use crate::api::routes::AppState;
use crate::api::snapshot;
use crate::db::repositories::JobRepository;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Merged status snapshot.
///
/// GET /status/:job
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusEnvelope>> {
    let job = require_owned_job(&state, &headers, &job_id).await?;
    let envelope = snapshot::build(&state.pipeline, &job).await?;
    Ok(Json(envelope))
}

/// Live event stream: a `status` frame on every change notification, plus a
/// `checkpoint_created` frame whenever the snapshot's checkpoint id differs
/// from the previous frame's.
///
/// GET /status/:job/stream
pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_owned_job(&state, &headers, &job_id).await?;

    let mut rx = state.pipeline.ctx.cache.subscribe(&job_id);
    let stream = async_stream::stream! {
        let mut last_checkpoint: Option<String> = None;

        // Initial frame so the client has a baseline snapshot.
        if let Some(envelope) = read_snapshot(&state, &job_id).await {
            for event in frames(&envelope, &mut last_checkpoint) {
                yield Ok(event);
            }
        }

        loop {
            match rx.recv().await {
                Ok(()) => {}
                // Dropped pings are fine: the next snapshot read catches up.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(job_id = %job_id, skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
            match read_snapshot(&state, &job_id).await {
                Some(envelope) => {
                    for event in frames(&envelope, &mut last_checkpoint) {
                        yield Ok(event);
                    }
                }
                // Job deleted mid-stream.
                None => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn read_snapshot(state: &AppState, job_id: &str) -> Option<StatusEnvelope> {
    let job = JobRepository::get_by_id(state.pipeline.ctx.db.pool(), job_id)
        .await
        .ok()??;
    snapshot::build(&state.pipeline, &job).await.ok()
}

/// Encode one snapshot into its SSE frames, tracking checkpoint changes.
fn frames(envelope: &StatusEnvelope, last_checkpoint: &mut Option<String>) -> Vec<Event> {
    let mut events = Vec::with_capacity(2);
    if let Ok(event) = Event::default().event("status").json_data(envelope) {
        events.push(event);
    }
    if let Some(current) = envelope.current_checkpoint.as_ref() {
        if last_checkpoint.as_deref() != Some(current.id.as_str()) {
            *last_checkpoint = Some(current.id.clone());
            let payload = CheckpointCreatedEvent {
                checkpoint_id: current.id.clone(),
                phase: current.phase,
                branch: current.branch.clone(),
            };
            if let Ok(event) = Event::default().event("checkpoint_created").json_data(&payload) {
                events.push(event);
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::CurrentCheckpointView;
    use domain::CostBreakdown;
    use std::collections::BTreeMap;

    fn envelope(checkpoint: Option<&str>) -> StatusEnvelope {
        StatusEnvelope {
            video_id: "job-1".to_string(),
            status: "running_phase_2".to_string(),
            progress: 20,
            current_phase: Some("phase2_storyboard".to_string()),
            error: None,
            cost_usd: 0.0,
            cost_breakdown: CostBreakdown::default(),
            warnings: vec![],
            storyboard_urls: None,
            chunk_urls: None,
            stitched_video_url: None,
            final_video_url: None,
            current_checkpoint: checkpoint.map(|id| CurrentCheckpointView {
                id: id.to_string(),
                branch: "main".to_string(),
                phase: 2,
                version: 1,
                status: "pending".to_string(),
                artifacts: BTreeMap::new(),
            }),
            checkpoint_tree: None,
            active_branches: None,
        }
    }

    #[test]
    fn test_checkpoint_created_emitted_once_per_checkpoint() {
        let mut last = None;
        assert_eq!(frames(&envelope(None), &mut last).len(), 1);
        assert_eq!(frames(&envelope(Some("cp-1")), &mut last).len(), 2);
        // Same checkpoint again: status only.
        assert_eq!(frames(&envelope(Some("cp-1")), &mut last).len(), 1);
        // New checkpoint: both frames again.
        assert_eq!(frames(&envelope(Some("cp-2")), &mut last).len(), 2);
    }
}
