//! adforge server binary.
//!
//! Boots the backends, the stage worker pool, the GC sweeper and the HTTP
//! API. Provider credentials come from the environment; everything else
//! from `adforge-server.toml` (or defaults).

use orchestrator::api::create_router;
use orchestrator::config::ServerConfig;
use orchestrator::db::{schema, DatabaseConnection};
use orchestrator::media::FfmpegMedia;
use orchestrator::pipeline::Pipeline;
use orchestrator::storage::{GcSweeper, LocalBlobStore, StateCache, UrlSigner};
use orchestrator::AppContext;
use providers::{
    HttpImageProvider, HttpMusicProvider, HttpPlannerProvider, HttpVideoProvider, ProviderConfig,
    ProviderSet,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = Arc::new(ServerConfig::load()?);
    tracing::info!(database = %config.database.path, "Configuration loaded");

    let db = DatabaseConnection::new(&config.database_url()).await?;
    schema::ensure_schema(db.pool()).await?;
    tracing::info!("Database ready");

    let blob = Arc::new(LocalBlobStore::new(config.storage.blob_root.clone()));
    let cache = Arc::new(StateCache::with_default_ttl());
    let signer = UrlSigner::new(
        config.storage.signing_key.clone(),
        config.storage.public_base_url.clone(),
        config.storage.url_ttl_s,
    );
    let media = Arc::new(FfmpegMedia::new(config.storage.work_dir.clone()));

    let providers = ProviderSet::new(
        Arc::new(HttpPlannerProvider::new(ProviderConfig::from_env(
            "ADFORGE_PLANNER_API_KEY",
            env_or("ADFORGE_PLANNER_URL", "https://api.anthropic.com"),
            env_or("ADFORGE_PLANNER_MODEL", "claude-sonnet-4-20250514"),
        )?)),
        Arc::new(HttpImageProvider::new(ProviderConfig::from_env(
            "ADFORGE_IMAGE_API_KEY",
            env_or("ADFORGE_IMAGE_URL", "https://api.image.example.com"),
            env_or("ADFORGE_IMAGE_MODEL", "sdxl"),
        )?)),
        Arc::new(HttpVideoProvider::new(ProviderConfig::from_env(
            "ADFORGE_VIDEO_API_KEY",
            env_or("ADFORGE_VIDEO_URL", "https://api.video.example.com"),
            env_or("ADFORGE_VIDEO_MODEL", "hailuo_fast"),
        )?)),
        Arc::new(HttpMusicProvider::new(ProviderConfig::from_env(
            "ADFORGE_MUSIC_API_KEY",
            env_or("ADFORGE_MUSIC_URL", "https://api.music.example.com"),
            env_or("ADFORGE_MUSIC_MODEL", "musicgen"),
        )?)),
    );

    let ctx = AppContext::new(
        db.clone(),
        blob.clone(),
        cache,
        signer,
        providers,
        media,
        config.clone(),
    );

    let (pipeline, queue_rx) = Pipeline::new(ctx);
    let workers = pipeline.spawn_workers(queue_rx, config.stage.worker_count);
    tracing::info!(count = workers.len(), "Stage workers running");

    let recovered = pipeline.recover_interrupted_jobs().await?;
    if recovered > 0 {
        tracing::info!(recovered, "Re-enqueued stages interrupted by the previous run");
    }

    let sweeper = GcSweeper::new(db, blob, config.gc.clone());
    tokio::spawn(sweeper.run());

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let router = create_router(pipeline);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "adforge server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
