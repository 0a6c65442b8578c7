//! Background garbage collection of dangling blobs.
//!
//! A failed or canceled stage can leave blobs that no checkpoint references.
//! The sweeper walks terminal failed/canceled jobs idle past a threshold and
//! deletes any blob under the job's prefix that no artifact row points at.

use crate::config::GcConfig;
use crate::db::repositories::ArtifactRepository;
use crate::db::DatabaseConnection;
use crate::storage::blob::BlobStore;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Sweeps dangling blobs for dead jobs.
pub struct GcSweeper {
    db: DatabaseConnection,
    blob: Arc<dyn BlobStore>,
    config: GcConfig,
}

impl GcSweeper {
    pub fn new(db: DatabaseConnection, blob: Arc<dyn BlobStore>, config: GcConfig) -> Self {
        Self { db, blob, config }
    }

    /// One sweep pass; returns the number of blobs removed.
    pub async fn run_once(&self) -> anyhow::Result<u64> {
        let cutoff =
            (Utc::now() - ChronoDuration::seconds(self.config.idle_threshold_s as i64)).to_rfc3339();
        let candidates =
            crate::db::repositories::JobRepository::list_gc_candidates(self.db.pool(), &cutoff)
                .await?;

        let mut removed = 0u64;
        for job in candidates {
            let referenced: HashSet<String> =
                ArtifactRepository::list_blob_paths_by_job(self.db.pool(), &job.id)
                    .await?
                    .into_iter()
                    .collect();
            let prefix = format!("{}/videos/{}", job.user_id, job.id);
            let stored = self.blob.list_prefix(&prefix).await?;
            for path in stored {
                if !referenced.contains(&path) {
                    self.blob.delete(&path).await?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!(removed, "GC sweep removed dangling blobs");
        }
        Ok(removed)
    }

    /// Run sweeps forever at the configured interval.
    pub async fn run(self) {
        let interval = std::time::Duration::from_secs(self.config.interval_s);
        loop {
            if let Err(e) = self.run_once().await {
                warn!(error = %e, "GC sweep failed");
            }
            tokio::time::sleep(interval).await;
        }
    }
}
