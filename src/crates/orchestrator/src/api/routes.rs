//! API route definitions.

use crate::pipeline::Pipeline;
use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Build the complete API router.
pub fn create_router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/health", get(handlers::health::health))
        // Job lifecycle
        .route("/generate", post(handlers::jobs::generate))
        .route("/videos", get(handlers::jobs::list_videos))
        .route(
            "/video/:job",
            get(handlers::jobs::get_video).delete(handlers::jobs::delete_video),
        )
        .route("/video/:job/continue", post(handlers::jobs::continue_video))
        .route("/video/:job/cancel", post(handlers::jobs::cancel_video))
        // Status + live stream
        .route("/status/:job", get(handlers::status::status))
        .route("/status/:job/stream", get(handlers::status::stream))
        // Checkpoint reads
        .route(
            "/video/:job/checkpoints",
            get(handlers::checkpoints::list_checkpoints),
        )
        .route(
            "/video/:job/checkpoints/current",
            get(handlers::checkpoints::current_checkpoint),
        )
        .route(
            "/video/:job/checkpoints/tree",
            get(handlers::checkpoints::checkpoint_tree),
        )
        .route(
            "/video/:job/checkpoints/:cp",
            get(handlers::checkpoints::checkpoint_detail),
        )
        .route("/video/:job/branches", get(handlers::checkpoints::branches))
        // Checkpoint edits
        .route(
            "/video/:job/checkpoints/:cp/spec",
            patch(handlers::edits::edit_spec),
        )
        .route(
            "/video/:job/checkpoints/:cp/upload-image",
            post(handlers::edits::upload_image),
        )
        .route(
            "/video/:job/checkpoints/:cp/regenerate-beat",
            post(handlers::edits::regenerate_beat),
        )
        .route(
            "/video/:job/checkpoints/:cp/regenerate-chunk",
            post(handlers::edits::regenerate_chunk),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
