//! Request and response DTOs for the HTTP surface.

use crate::checkpoint::TreeNode;
use crate::db::models::CheckpointRow;
use domain::{AudioSpec, Beat, CostBreakdown, ProductSpec, StyleSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `POST /generate` body.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub reference_assets: Vec<String>,
    #[serde(default)]
    pub auto_continue: bool,
}

/// `POST /generate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub video_id: String,
    pub status: String,
}

/// `POST /video/{job}/continue` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinueRequest {
    pub checkpoint_id: String,
}

/// `POST /video/{job}/continue` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueResponse {
    /// 1-based number of the dispatched phase; absent when the job completed.
    pub next_phase: Option<u8>,
    pub branch_name: String,
    pub created_new_branch: bool,
}

/// One artifact in API responses, blob references replaced by signed URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactView {
    pub id: String,
    pub kind: String,
    pub key: String,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub provider_tag: String,
    pub cost_usd: f64,
}

/// Checkpoint summary used in lists, trees and the status envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointView {
    pub id: String,
    pub branch: String,
    pub phase: u8,
    pub version: i64,
    pub status: String,
    pub parent_id: Option<String>,
    pub created_at: String,
}

impl CheckpointView {
    pub fn from_row(row: &CheckpointRow) -> Self {
        Self {
            id: row.id.clone(),
            branch: row.branch.clone(),
            phase: row.phase as u8,
            version: row.version,
            status: row.status.clone(),
            parent_id: row.parent_id.clone(),
            created_at: row.created_at.clone(),
        }
    }
}

/// One node of the checkpoint tree in API form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeView {
    pub checkpoint: CheckpointView,
    pub children: Vec<TreeView>,
}

impl TreeView {
    pub fn from_node(node: &TreeNode) -> Self {
        Self {
            checkpoint: CheckpointView::from_row(&node.checkpoint),
            children: node.children.iter().map(TreeView::from_node).collect(),
        }
    }
}

/// One active branch in the status envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchView {
    pub name: String,
    pub latest_checkpoint_id: String,
    pub phase: u8,
    pub can_continue: bool,
}

/// Current checkpoint detail inside the status envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentCheckpointView {
    pub id: String,
    pub branch: String,
    pub phase: u8,
    pub version: i64,
    pub status: String,
    /// Artifacts keyed `kind/key`.
    pub artifacts: BTreeMap<String, ArtifactView>,
}

/// The status envelope served by `GET /status/{job}` and the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub video_id: String,
    pub status: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cost_usd: f64,
    pub cost_breakdown: CostBreakdown,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storyboard_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stitched_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_checkpoint: Option<CurrentCheckpointView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_tree: Option<Vec<TreeView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_branches: Option<Vec<BranchView>>,
}

/// `checkpoint_created` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointCreatedEvent {
    pub checkpoint_id: String,
    pub phase: u8,
    pub branch: String,
}

/// `GET /video/{job}` response.
#[derive(Debug, Clone, Serialize)]
pub struct VideoDetailResponse {
    pub video_id: String,
    pub title: Option<String>,
    pub prompt: String,
    pub model: String,
    pub auto_continue: bool,
    pub status: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cost_usd: f64,
    pub duration_ms: i64,
    pub current_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// `PATCH /video/{job}/checkpoints/{cp}/spec` body.
#[derive(Debug, Clone, Deserialize)]
pub struct EditSpecRequest {
    #[serde(default)]
    pub beats: Option<Vec<Beat>>,
    #[serde(default)]
    pub style: Option<StyleSpec>,
    #[serde(default)]
    pub product: Option<ProductSpec>,
    #[serde(default)]
    pub audio: Option<AudioSpec>,
}

/// Response for spec edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSpecResponse {
    pub artifact_id: String,
    pub version: i64,
}

/// `POST …/regenerate-beat` body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateBeatRequest {
    pub beat_index: usize,
    #[serde(default)]
    pub prompt_override: Option<String>,
}

/// `POST …/regenerate-chunk` body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateChunkRequest {
    pub chunk_index: usize,
    #[serde(default)]
    pub model_override: Option<String>,
}

/// Response for image/chunk replacement endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactUpdateResponse {
    pub artifact_id: String,
    pub s3_url: String,
    pub version: i64,
}

/// `GET /video/{job}/checkpoints` response.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointListResponse {
    pub checkpoints: Vec<CheckpointView>,
    pub tree: Vec<TreeView>,
}

/// `GET /video/{job}/checkpoints/{cp}` response.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointDetailResponse {
    pub checkpoint: CheckpointView,
    pub artifacts: Vec<ArtifactView>,
}
