//! Health endpoint.

use crate::api::routes::AppState;
use axum::{extract::State, Json};
use serde_json::json;

/// Backend health summary.
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.pipeline.ctx.db.health_check().await.is_ok();
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
    }))
}
