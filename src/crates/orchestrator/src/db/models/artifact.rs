//! Artifact row model.

use domain::ArtifactKind;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One versioned artifact on a checkpoint.
///
/// Either `payload` (inline JSON, used for the spec) or `blob_path` (the
/// canonical storage path) is set; never both.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArtifactRow {
    pub id: String,
    pub checkpoint_id: String,
    /// Artifact kind wire string (see `domain::ArtifactKind`).
    pub kind: String,
    /// Key within the kind, e.g. `beat_03`, `chunk_07`, `spec`.
    pub key: String,
    /// Version, starting at 1; edits increment in place.
    pub version: i64,
    /// Inline JSON payload (spec artifacts).
    pub payload: Option<String>,
    /// Canonical blob path (all blob-backed kinds).
    pub blob_path: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    /// Provider model tag that produced this version.
    pub provider_tag: String,
    pub cost_usd: f64,
    pub created_at: String,
}

impl ArtifactRow {
    /// Typed artifact kind.
    pub fn artifact_kind(&self) -> Option<ArtifactKind> {
        self.kind.parse().ok()
    }

    /// Inline payload parsed as JSON.
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        self.payload
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_payload_parse() {
        let row = ArtifactRow {
            id: "a-1".to_string(),
            checkpoint_id: "cp-1".to_string(),
            kind: "spec".to_string(),
            key: "spec".to_string(),
            version: 2,
            payload: Some(r#"{"duration_s":30}"#.to_string()),
            blob_path: None,
            content_type: Some("application/json".to_string()),
            size_bytes: None,
            provider_tag: "mock-planner".to_string(),
            cost_usd: 0.03,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(row.artifact_kind(), Some(ArtifactKind::Spec));
        assert_eq!(row.payload_json().unwrap()["duration_s"], 30);
    }
}
