//! Shared application context.
//!
//! Backends are instantiated once at process start and passed by context;
//! nothing in the pipeline reaches for globals.

use crate::config::ServerConfig;
use crate::db::DatabaseConnection;
use crate::media::Media;
use crate::storage::{BlobStore, StateCache, UrlSigner};
use providers::ProviderSet;
use std::sync::Arc;

/// Injected backends shared across the orchestrator.
#[derive(Clone)]
pub struct AppContext {
    pub db: DatabaseConnection,
    pub blob: Arc<dyn BlobStore>,
    pub cache: Arc<StateCache>,
    pub signer: UrlSigner,
    pub providers: ProviderSet,
    pub media: Arc<dyn Media>,
    pub config: Arc<ServerConfig>,
}

impl AppContext {
    pub fn new(
        db: DatabaseConnection,
        blob: Arc<dyn BlobStore>,
        cache: Arc<StateCache>,
        signer: UrlSigner,
        providers: ProviderSet,
        media: Arc<dyn Media>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            db,
            blob,
            cache,
            signer,
            providers,
            media,
            config,
        }
    }
}
