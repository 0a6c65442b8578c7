//! Shared context handed to every stage body.

use super::{Result, StageError};
use crate::checkpoint::CheckpointStore;
use crate::context::AppContext;
use crate::db::models::JobRow;
use crate::db::repositories::CostRepository;
use crate::progress::{CostAdd, ProgressChannel, ProgressDelta};
use crate::queue::CancelFlag;
use domain::{ArtifactKind, Phase, VideoSpec};
use providers::ProviderError;
use std::sync::Arc;
use std::time::Duration;

/// Everything a stage body needs: injected backends, the progress channel,
/// the checkpoint store, the job row as of dispatch, and the cancel flag.
pub struct StageContext {
    pub app: AppContext,
    pub progress: Arc<ProgressChannel>,
    pub store: Arc<CheckpointStore>,
    pub cancel: CancelFlag,
    pub job: JobRow,
}

impl StageContext {
    /// Cancellation check; call at every suspension point.
    pub fn check_canceled(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            Err(StageError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Record one provider call's cost in the ledger and the progress
    /// channel, enforcing the per-job spend cap.
    pub async fn record_cost(
        &self,
        phase: Phase,
        provider: &str,
        model_tag: &str,
        usd: f64,
        duration: Duration,
    ) -> Result<()> {
        CostRepository::insert(
            self.app.db.pool(),
            &self.job.id,
            phase.number() as i64,
            provider,
            model_tag,
            usd,
            duration.as_secs_f64(),
        )
        .await?;
        self.progress
            .update(
                &self.job.id,
                ProgressDelta::new().with_cost(CostAdd {
                    phase,
                    usd,
                    duration_ms: duration.as_millis() as i64,
                }),
            )
            .await;

        let total = CostRepository::total_by_job(self.app.db.pool(), &self.job.id).await?;
        let cap = self.app.config.stage.spend_cap_usd;
        if total > cap {
            return Err(StageError::Provider(ProviderError::Fatal(format!(
                "spend cap exceeded: {total:.2} USD > {cap:.2} USD"
            ))));
        }
        Ok(())
    }

    /// Report interpolated progress inside a phase; stays strictly below the
    /// phase's completion anchor, which the orchestrator sets at checkpoint
    /// time.
    pub async fn report_progress(&self, phase: Phase, fraction: f64) {
        let start = phase.start_percent() as f64;
        let end = phase.completion_percent() as f64;
        let span = (end - start - 1.0).max(0.0);
        let percent = (start + span * fraction.clamp(0.0, 1.0)) as u8;
        self.progress
            .update(
                &self.job.id,
                ProgressDelta::new().with_percent(percent).with_phase(phase),
            )
            .await;
    }

    /// Record a non-fatal warning.
    pub async fn warn(&self, message: impl Into<String>) {
        self.progress
            .update(&self.job.id, ProgressDelta::new().with_warning(message))
            .await;
    }

    /// Load the typed spec artifact from a checkpoint.
    pub async fn spec_from_checkpoint(&self, checkpoint_id: &str) -> Result<VideoSpec> {
        let artifact = self
            .store
            .find_artifact(checkpoint_id, ArtifactKind::Spec, "spec")
            .await?
            .ok_or_else(|| {
                StageError::Validation(format!("checkpoint {checkpoint_id} has no spec artifact"))
            })?;
        let payload = artifact.payload_json().ok_or_else(|| {
            StageError::Validation(format!("spec artifact on {checkpoint_id} is not inline JSON"))
        })?;
        Ok(VideoSpec::from_json(payload)?)
    }

    /// Read a blob-backed artifact's bytes.
    pub async fn artifact_bytes(
        &self,
        checkpoint_id: &str,
        kind: ArtifactKind,
        key: &str,
    ) -> Result<Vec<u8>> {
        let artifact = self
            .store
            .find_artifact(checkpoint_id, kind, key)
            .await?
            .ok_or_else(|| {
                StageError::Validation(format!("missing artifact {kind}/{key} on {checkpoint_id}"))
            })?;
        let path = artifact.blob_path.ok_or_else(|| {
            StageError::Validation(format!("artifact {kind}/{key} has no blob reference"))
        })?;
        Ok(self.app.blob.get(&path).await.map_err(crate::checkpoint::StoreError::from)?)
    }
}
