//! The checkpoint store over the metadata and blob backends.

use super::branch::next_child_branch;
use super::{Result, StoreError};
use crate::db::models::{ArtifactRow, CheckpointRow, CheckpointStatus};
use crate::db::repositories::artifact_repo::ArtifactWrite;
use crate::db::repositories::{ArtifactRepository, CheckpointRepository};
use crate::db::DatabaseConnection;
use crate::storage::BlobStore;
use domain::{ArtifactKind, BlobPath, CheckpointId, JobId, Phase, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Content of one artifact version: inline JSON (spec) or blob bytes.
pub enum ArtifactContent<'a> {
    Json(&'a serde_json::Value),
    Blob(&'a [u8]),
}

/// One node of the checkpoint forest.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub checkpoint: CheckpointRow,
    pub children: Vec<TreeNode>,
}

/// Versioned checkpoint + artifact store (transactional over the metadata
/// store; blob writes precede row writes so a crash leaves only dangling
/// blobs, never dangling rows).
pub struct CheckpointStore {
    db: DatabaseConnection,
    blob: Arc<dyn BlobStore>,
}

impl CheckpointStore {
    pub fn new(db: DatabaseConnection, blob: Arc<dyn BlobStore>) -> Self {
        Self { db, blob }
    }

    /// The pending checkpoint for (job, branch, phase), creating the next
    /// version if none is pending. Creating supersedes any prior
    /// non-superseded checkpoint on the same key, keeping the invariant of
    /// one live checkpoint per (job, branch, phase).
    pub async fn ensure_pending_checkpoint(
        &self,
        job_id: &str,
        branch: &str,
        phase: Phase,
        parent_id: Option<&str>,
    ) -> Result<CheckpointRow> {
        let phase_n = phase.number() as i64;
        if let Some(pending) =
            CheckpointRepository::find_pending(self.db.pool(), job_id, branch, phase_n).await?
        {
            return Ok(pending);
        }

        let mut tx = self.db.pool().begin().await?;
        let version =
            CheckpointRepository::max_version(&mut *tx, job_id, branch, phase_n).await? + 1;
        let id = Uuid::new_v4().to_string();
        let row = CheckpointRepository::create(
            &mut *tx, &id, job_id, parent_id, branch, phase_n, version,
        )
        .await?;
        CheckpointRepository::supersede_siblings(&mut *tx, job_id, branch, phase_n, &id).await?;
        tx.commit().await?;
        debug!(job_id, branch, phase = phase_n, version, "Created checkpoint");
        Ok(row)
    }

    /// Write one artifact version: insert at version 1 or bump in place.
    /// Blob-backed kinds are uploaded to the canonical path for the new
    /// version before the row is written.
    pub async fn put_artifact(
        &self,
        checkpoint: &CheckpointRow,
        user_id: &str,
        kind: ArtifactKind,
        key: &str,
        content: ArtifactContent<'_>,
        provider_tag: &str,
        cost_usd: f64,
    ) -> Result<ArtifactRow> {
        let existing =
            ArtifactRepository::find(self.db.pool(), &checkpoint.id, kind.as_str(), key).await?;
        let next_version = existing.as_ref().map(|a| a.version + 1).unwrap_or(1);

        let (payload, blob_path, size_bytes) = match content {
            ArtifactContent::Json(value) => (Some(value.to_string()), None, None),
            ArtifactContent::Blob(bytes) => {
                let path = BlobPath {
                    user: UserId::from(user_id),
                    job: JobId::from(checkpoint.job_id.as_str()),
                    branch: checkpoint.branch.clone(),
                    checkpoint: CheckpointId::from(checkpoint.id.as_str()),
                    kind,
                    key: key.to_string(),
                    version: next_version as u32,
                }
                .render();
                self.blob.put(&path, bytes).await?;
                (None, Some(path), Some(bytes.len() as i64))
            }
        };

        let write = ArtifactWrite {
            payload: payload.as_deref(),
            blob_path: blob_path.as_deref(),
            content_type: Some(kind.content_type()),
            size_bytes,
            provider_tag,
            cost_usd,
        };

        let row = match existing {
            Some(artifact) => {
                ArtifactRepository::bump_version(self.db.pool(), &artifact.id, write).await?
            }
            None => {
                let id = Uuid::new_v4().to_string();
                ArtifactRepository::insert(
                    self.db.pool(),
                    &id,
                    &checkpoint.id,
                    kind.as_str(),
                    key,
                    write,
                )
                .await?
            }
        };
        Ok(row)
    }

    /// Get a checkpoint by id.
    pub async fn get(&self, checkpoint_id: &str) -> Result<CheckpointRow> {
        CheckpointRepository::get_by_id(self.db.pool(), checkpoint_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("checkpoint {checkpoint_id}")))
    }

    /// All artifacts on a checkpoint.
    pub async fn artifacts(&self, checkpoint_id: &str) -> Result<Vec<ArtifactRow>> {
        Ok(ArtifactRepository::list_by_checkpoint(self.db.pool(), checkpoint_id).await?)
    }

    /// One artifact by (checkpoint, kind, key).
    pub async fn find_artifact(
        &self,
        checkpoint_id: &str,
        kind: ArtifactKind,
        key: &str,
    ) -> Result<Option<ArtifactRow>> {
        Ok(ArtifactRepository::find(self.db.pool(), checkpoint_id, kind.as_str(), key).await?)
    }

    /// Approve a checkpoint (idempotent) and supersede any still-pending
    /// sibling on the same (job, branch, phase).
    pub async fn approve(&self, checkpoint_id: &str) -> Result<CheckpointRow> {
        let checkpoint = self.get(checkpoint_id).await?;
        let mut tx = self.db.pool().begin().await?;
        CheckpointRepository::approve(&mut *tx, checkpoint_id).await?;
        CheckpointRepository::supersede_siblings(
            &mut *tx,
            &checkpoint.job_id,
            &checkpoint.branch,
            checkpoint.phase,
            checkpoint_id,
        )
        .await?;
        tx.commit().await?;
        self.get(checkpoint_id).await
    }

    /// Any artifact on the checkpoint carries version > 1.
    pub async fn has_been_edited(&self, checkpoint_id: &str) -> Result<bool> {
        Ok(ArtifactRepository::has_version_above_one(self.db.pool(), checkpoint_id).await?)
    }

    /// Checkpoints for a job ordered by (phase, created_at), optionally for
    /// one branch.
    pub async fn list(&self, job_id: &str, branch: Option<&str>) -> Result<Vec<CheckpointRow>> {
        Ok(CheckpointRepository::list_by_job(self.db.pool(), job_id, branch).await?)
    }

    /// Distinct branch names for a job.
    pub async fn branches(&self, job_id: &str) -> Result<Vec<String>> {
        Ok(CheckpointRepository::list_branches(self.db.pool(), job_id).await?)
    }

    /// Allocate a fresh child branch name under `parent_branch`.
    pub async fn allocate_child_branch(&self, job_id: &str, parent_branch: &str) -> Result<String> {
        let existing = self.branches(job_id).await?;
        Ok(next_child_branch(&existing, parent_branch))
    }

    /// Reconstruct the parent-link forest; roots are phase-1 checkpoints.
    pub async fn tree(&self, job_id: &str) -> Result<Vec<TreeNode>> {
        let rows = self.list(job_id, None).await?;
        Ok(build_forest(rows))
    }

    /// The latest non-superseded checkpoint on a branch, by phase.
    pub async fn latest_on_branch(
        &self,
        job_id: &str,
        branch: &str,
    ) -> Result<Option<CheckpointRow>> {
        let rows = self.list(job_id, Some(branch)).await?;
        Ok(rows
            .into_iter()
            .filter(|c| c.checkpoint_status() != CheckpointStatus::Superseded)
            .max_by_key(|c| c.phase))
    }
}

/// Assemble rows into a forest by parent link, preserving row order within
/// each child list.
fn build_forest(rows: Vec<CheckpointRow>) -> Vec<TreeNode> {
    use std::collections::HashMap;

    let mut children_of: HashMap<Option<String>, Vec<CheckpointRow>> = HashMap::new();
    for row in rows {
        children_of.entry(row.parent_id.clone()).or_default().push(row);
    }

    fn attach(
        parent: Option<&str>,
        children_of: &mut HashMap<Option<String>, Vec<CheckpointRow>>,
    ) -> Vec<TreeNode> {
        let rows = children_of.remove(&parent.map(|s| s.to_string())).unwrap_or_default();
        rows.into_iter()
            .map(|row| {
                let id = row.id.clone();
                TreeNode {
                    checkpoint: row,
                    children: attach(Some(&id), children_of),
                }
            })
            .collect()
    }

    attach(None, &mut children_of)
}
