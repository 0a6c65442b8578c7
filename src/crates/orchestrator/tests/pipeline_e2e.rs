//! End-to-end pipeline scenarios over mock providers and mock media.

use orchestrator::api::models::GenerateRequest;
use orchestrator::checkpoint::ArtifactContent;
use orchestrator::config::ServerConfig;
use orchestrator::db::models::{CheckpointStatus, JobRow};
use orchestrator::db::repositories::JobRepository;
use orchestrator::db::DatabaseConnection;
use orchestrator::media::{Media, MockMedia};
use orchestrator::pipeline::{Pipeline, PipelineError, StartRequest};
use orchestrator::storage::{BlobStore, LocalBlobStore, StateCache, UrlSigner};
use orchestrator::AppContext;
use providers::mock::{
    MockImageProvider, MockMusicProvider, MockPlannerProvider, MockVideoProvider,
};
use providers::ProviderSet;
use domain::{ArtifactKind, JobStatus, Phase};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    pipeline: Arc<Pipeline>,
    db: DatabaseConnection,
}

async fn harness_with(providers: ProviderSet, media: Arc<dyn Media>) -> Harness {
    let db = DatabaseConnection::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let blob: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()));
    let cache = Arc::new(StateCache::with_default_ttl());
    let signer = UrlSigner::new("test-signing-key", "https://cdn.test/blobs", 3_600);
    let config = Arc::new(ServerConfig::default());
    let ctx = AppContext::new(db.clone(), blob, cache, signer, providers, media, config);
    let (pipeline, rx) = Pipeline::new(ctx);
    let _workers = pipeline.spawn_workers(rx, 2);
    Harness {
        _dir: dir,
        pipeline,
        db,
    }
}

async fn harness() -> Harness {
    harness_with(
        ProviderSet::new(
            Arc::new(MockPlannerProvider::new()),
            Arc::new(MockImageProvider::new()),
            Arc::new(MockVideoProvider::new()),
            Arc::new(MockMusicProvider::new()),
        ),
        Arc::new(MockMedia::new()),
    )
    .await
}

fn start_request(auto_continue: bool) -> StartRequest {
    StartRequest {
        user_id: "user-1".to_string(),
        prompt: "30-second coffee ad".to_string(),
        title: Some("Morning Rocket".to_string()),
        model_tag: Some("hailuo_fast".to_string()),
        reference_assets: vec![],
        auto_continue,
    }
}

async fn wait_for<F>(db: &DatabaseConnection, job_id: &str, predicate: F) -> JobRow
where
    F: Fn(&JobRow) -> bool,
{
    for _ in 0..500 {
        if let Some(job) = JobRepository::get_by_id(db.pool(), job_id).await.unwrap() {
            if predicate(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached the expected state");
}

// S1: auto-advance happy path.
#[tokio::test]
async fn s1_auto_advance_reaches_complete_with_four_approved_checkpoints() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(true)).await.unwrap();

    let done = wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::Complete).await;
    assert_eq!(done.progress, 100);
    assert!(done.final_video_path.is_some());

    let checkpoints = h.pipeline.store.list(&job.id, Some("main")).await.unwrap();
    assert_eq!(checkpoints.len(), 4);
    for (i, cp) in checkpoints.iter().enumerate() {
        assert_eq!(cp.phase, (i + 1) as i64);
        assert_eq!(cp.checkpoint_status(), CheckpointStatus::Approved);
    }

    // Cost breakdown has a non-zero entry for every phase.
    let envelope = orchestrator::api::snapshot::build(&h.pipeline, &done).await.unwrap();
    for phase in Phase::ALL {
        let usd = envelope.cost_breakdown.0.get(phase.label()).copied().unwrap_or(0.0);
        assert!(usd > 0.0, "no cost recorded for {}", phase.label());
    }
    assert!(envelope.final_video_url.is_some());
    assert!(envelope.final_video_url.unwrap().contains("expires="));
}

// S2: manual pause at every phase boundary.
#[tokio::test]
async fn s2_manual_mode_pauses_and_continue_advances() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(false)).await.unwrap();

    let paused = wait_for(&h.db, &job.id, |j| {
        j.job_status() == JobStatus::PausedAt(Phase::Plan)
    })
    .await;
    let cp1_id = paused.current_checkpoint_id.clone().unwrap();
    let cp1 = h.pipeline.store.get(&cp1_id).await.unwrap();
    assert_eq!(cp1.checkpoint_status(), CheckpointStatus::Pending);
    assert_eq!(h.pipeline.store.list(&job.id, None).await.unwrap().len(), 1);

    let outcome = h.pipeline.continue_job(&job.id, &cp1_id).await.unwrap();
    assert_eq!(outcome.next_phase, Some(Phase::Storyboard));
    assert_eq!(outcome.branch, "main");
    assert!(!outcome.created_new_branch);

    let paused2 = wait_for(&h.db, &job.id, |j| {
        j.job_status() == JobStatus::PausedAt(Phase::Storyboard)
    })
    .await;
    assert_ne!(paused2.current_checkpoint_id.as_deref(), Some(cp1_id.as_str()));

    // The phase-1 checkpoint is now approved.
    assert_eq!(
        h.pipeline.store.get(&cp1_id).await.unwrap().checkpoint_status(),
        CheckpointStatus::Approved
    );
}

// S2 addendum: continue validation.
#[tokio::test]
async fn s2_continue_rejects_wrong_checkpoint() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(false)).await.unwrap();
    wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::PausedAt(Phase::Plan)).await;

    let err = h.pipeline.continue_job(&job.id, "no-such-checkpoint").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

// S3: editing the spec then continuing forks a branch.
#[tokio::test]
async fn s3_edit_induced_branch() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(false)).await.unwrap();
    let paused = wait_for(&h.db, &job.id, |j| {
        j.job_status() == JobStatus::PausedAt(Phase::Plan)
    })
    .await;
    let cp1_id = paused.current_checkpoint_id.clone().unwrap();
    let cp1 = h.pipeline.store.get(&cp1_id).await.unwrap();

    // Replace one beat duration (still from the allowed set) and bump the
    // spec artifact, as PATCH /spec does.
    let spec_artifact = h
        .pipeline
        .store
        .find_artifact(&cp1_id, ArtifactKind::Spec, "spec")
        .await
        .unwrap()
        .unwrap();
    let mut spec = domain::VideoSpec::from_json(spec_artifact.payload_json().unwrap()).unwrap();
    spec.beats[0].duration_s = 15;
    let mut start = 0;
    for beat in &mut spec.beats {
        beat.start_s = start;
        start += beat.duration_s;
    }
    spec.duration_s = start;
    spec.validate().unwrap();
    let edited = h
        .pipeline
        .store
        .put_artifact(
            &cp1,
            "user-1",
            ArtifactKind::Spec,
            "spec",
            ArtifactContent::Json(&spec.to_json()),
            "user-edit",
            0.0,
        )
        .await
        .unwrap();
    assert_eq!(edited.version, 2);
    assert!(h.pipeline.store.has_been_edited(&cp1_id).await.unwrap());

    let outcome = h.pipeline.continue_job(&job.id, &cp1_id).await.unwrap();
    assert_eq!(outcome.branch, "main-1");
    assert!(outcome.created_new_branch);

    let paused2 = wait_for(&h.db, &job.id, |j| {
        j.job_status() == JobStatus::PausedAt(Phase::Storyboard)
    })
    .await;
    assert_eq!(paused2.current_branch, "main-1");

    // The original branch still ends at the approved phase-1 checkpoint
    // with no phase-2 child.
    let main_rows = h.pipeline.store.list(&job.id, Some("main")).await.unwrap();
    assert_eq!(main_rows.len(), 1);
    assert_eq!(main_rows[0].checkpoint_status(), CheckpointStatus::Approved);
    let branch_rows = h.pipeline.store.list(&job.id, Some("main-1")).await.unwrap();
    assert_eq!(branch_rows.len(), 1);
    assert_eq!(branch_rows[0].phase, 2);
    assert_eq!(branch_rows[0].parent_id.as_deref(), Some(cp1_id.as_str()));
}

// S4: fatal provider failure in phase 2.
#[tokio::test]
async fn s4_image_quota_failure_fails_job_but_keeps_history() {
    let h = harness_with(
        ProviderSet::new(
            Arc::new(MockPlannerProvider::new()),
            Arc::new(MockImageProvider::new().failing("quota_exceeded")),
            Arc::new(MockVideoProvider::new()),
            Arc::new(MockMusicProvider::new()),
        ),
        Arc::new(MockMedia::new()),
    )
    .await;
    let job = h.pipeline.start(start_request(true)).await.unwrap();

    let failed = wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::Failed).await;
    assert_eq!(failed.current_phase.as_deref(), Some("phase2_storyboard"));
    assert!(failed.error.unwrap().contains("quota"));

    // Phase-1 checkpoint remains approved and inspectable.
    let checkpoints = h.pipeline.store.list(&job.id, None).await.unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].phase, 1);
    assert_eq!(checkpoints[0].checkpoint_status(), CheckpointStatus::Approved);
}

// S5: chunk regeneration bumps the artifact version and forks on continue.
#[tokio::test]
async fn s5_chunk_regeneration_bumps_version_and_branches() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(false)).await.unwrap();

    // Walk manually to the phase-3 pause.
    for phase in [Phase::Plan, Phase::Storyboard] {
        let paused =
            wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::PausedAt(phase)).await;
        h.pipeline
            .continue_job(&job.id, &paused.current_checkpoint_id.unwrap())
            .await
            .unwrap();
    }
    let paused3 = wait_for(&h.db, &job.id, |j| {
        j.job_status() == JobStatus::PausedAt(Phase::Chunks)
    })
    .await;
    let cp3_id = paused3.current_checkpoint_id.clone().unwrap();
    let cp3 = h.pipeline.store.get(&cp3_id).await.unwrap();

    // 30s / 5s chunks -> chunk_03 exists at version 1.
    let chunk = h
        .pipeline
        .store
        .find_artifact(&cp3_id, ArtifactKind::Chunk, "chunk_03")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunk.version, 1);

    let bumped = h
        .pipeline
        .store
        .put_artifact(
            &cp3,
            "user-1",
            ArtifactKind::Chunk,
            "chunk_03",
            ArtifactContent::Blob(b"regenerated with veo"),
            "veo",
            0.96,
        )
        .await
        .unwrap();
    assert_eq!(bumped.version, 2);
    assert!(bumped.blob_path.unwrap().contains("_v2"));
    assert!(h.pipeline.store.has_been_edited(&cp3_id).await.unwrap());

    let outcome = h.pipeline.continue_job(&job.id, &cp3_id).await.unwrap();
    assert!(outcome.created_new_branch);
    assert_eq!(outcome.branch, "main-1");
    assert_eq!(outcome.next_phase, Some(Phase::Refine));
}

// S6: live change feed: one checkpoint per phase, monotone progress.
#[tokio::test]
async fn s6_live_feed_sees_four_checkpoints_and_monotone_progress() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(true)).await.unwrap();

    let mut rx = h.pipeline.ctx.cache.subscribe(&job.id);
    let progress_channel = h.pipeline.progress.clone();
    let job_id = job.id.clone();
    let collector = tokio::spawn(async move {
        let mut frames: Vec<(String, u8, Option<String>)> = Vec::new();
        loop {
            match rx.recv().await {
                Ok(()) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
            if let Some(live) = progress_channel.live_state(&job_id) {
                let status = live.status.clone().unwrap_or_default();
                frames.push((status.clone(), live.progress, live.checkpoint_id.clone()));
                if status == "complete" {
                    break;
                }
            }
        }
        frames
    });

    wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::Complete).await;
    let frames = tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .unwrap()
        .unwrap();

    assert!(frames.len() >= 4, "expected at least four frames, got {}", frames.len());
    let mut last = 0u8;
    for (_, progress, _) in &frames {
        assert!(*progress >= last, "progress regressed: {progress} < {last}");
        last = *progress;
    }
    let distinct_checkpoints: std::collections::HashSet<_> = frames
        .iter()
        .filter_map(|(_, _, cp)| cp.clone())
        .collect();
    assert_eq!(distinct_checkpoints.len(), 4);
}

// Cancellation is idempotent and terminal.
#[tokio::test]
async fn cancel_is_idempotent() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(false)).await.unwrap();
    wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::PausedAt(Phase::Plan)).await;

    h.pipeline.cancel(&job.id).await.unwrap();
    h.pipeline.cancel(&job.id).await.unwrap();
    let job_row = wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::Canceled).await;
    assert_eq!(job_row.status, "canceled");
}

// Redelivering the same stage task reuses the checkpoint and bumps versions.
#[tokio::test]
async fn redelivered_stage_task_does_not_duplicate_checkpoints() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(false)).await.unwrap();
    let paused = wait_for(&h.db, &job.id, |j| {
        j.job_status() == JobStatus::PausedAt(Phase::Plan)
    })
    .await;
    let cp1_id = paused.current_checkpoint_id.unwrap();

    // Simulate an at-least-once redelivery of the phase-1 task.
    h.pipeline
        .process_task(orchestrator::queue::StageTask::new(&job.id, Phase::Plan, None))
        .await;

    let checkpoints = h.pipeline.store.list(&job.id, None).await.unwrap();
    assert_eq!(checkpoints.len(), 1);
    let spec = h
        .pipeline
        .store
        .find_artifact(&cp1_id, ArtifactKind::Spec, "spec")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(spec.version, 2);
}

// A stage left running by a crashed process is re-enqueued on startup.
#[tokio::test]
async fn startup_recovery_reenqueues_interrupted_stage() {
    let db = DatabaseConnection::in_memory().await.unwrap();
    let dir = TempDir::new().unwrap();
    let blob: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()));
    let ctx = AppContext::new(
        db.clone(),
        blob,
        Arc::new(StateCache::with_default_ttl()),
        UrlSigner::new("test-signing-key", "https://cdn.test/blobs", 3_600),
        ProviderSet::new(
            Arc::new(MockPlannerProvider::new()),
            Arc::new(MockImageProvider::new()),
            Arc::new(MockVideoProvider::new()),
            Arc::new(MockMusicProvider::new()),
        ),
        Arc::new(MockMedia::new()),
        Arc::new(ServerConfig::default()),
    );

    // First process: dispatches phase 1, then "crashes" with no worker ever
    // pulling the task. The durable row is left running.
    let (crashed, _stranded_rx) = Pipeline::new(ctx.clone());
    let job = crashed.start(start_request(true)).await.unwrap();
    let row = JobRepository::get_by_id(db.pool(), &job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "running_phase_1");

    // Second process: fresh queue, workers, and the startup scan.
    let (pipeline, rx) = Pipeline::new(ctx);
    let _workers = pipeline.spawn_workers(rx, 2);
    assert_eq!(pipeline.recover_interrupted_jobs().await.unwrap(), 1);

    wait_for(&db, &job.id, |j| j.job_status() == JobStatus::Complete).await;
    let checkpoints = pipeline.store.list(&job.id, Some("main")).await.unwrap();
    assert_eq!(checkpoints.len(), 4);
}

// Delete removes rows and blobs.
#[tokio::test]
async fn delete_removes_rows_and_blobs() {
    let h = harness().await;
    let job = h.pipeline.start(start_request(true)).await.unwrap();
    wait_for(&h.db, &job.id, |j| j.job_status() == JobStatus::Complete).await;

    h.pipeline.delete(&job.id).await.unwrap();
    assert!(JobRepository::get_by_id(h.db.pool(), &job.id).await.unwrap().is_none());
    assert!(h.pipeline.store.list(&job.id, None).await.unwrap().is_empty());
    let leftover = h
        .pipeline
        .ctx
        .blob
        .list_prefix(&format!("user-1/videos/{}", job.id))
        .await
        .unwrap();
    assert!(leftover.is_empty());
}

// The API models deserialize the documented wire shapes.
#[test]
fn generate_request_wire_shape() {
    let parsed: GenerateRequest = serde_json::from_str(
        r#"{"prompt": "coffee ad", "model": "hailuo_fast", "auto_continue": true}"#,
    )
    .unwrap();
    assert_eq!(parsed.prompt, "coffee ad");
    assert_eq!(parsed.model.as_deref(), Some("hailuo_fast"));
    assert!(parsed.auto_continue);
    assert!(parsed.reference_assets.is_empty());
}
