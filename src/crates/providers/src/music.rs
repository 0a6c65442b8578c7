//! Music capability: background track generation for the refine phase.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::planner::check_status;
use crate::rate_limit::TokenBucket;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::CapabilityOutput;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Flat price per generated track, USD.
const USD_PER_TRACK: f64 = 0.10;

/// A music generation request.
#[derive(Debug, Clone)]
pub struct MusicRequest {
    /// Genre/style prompt from the spec's audio directives.
    pub style: String,
    /// Track duration, seconds.
    pub duration_s: u32,
}

/// The music generation capability.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// Generate one MP3 track.
    async fn generate(&self, request: MusicRequest) -> Result<CapabilityOutput<Vec<u8>>>;

    fn model_tag(&self) -> &str;
}

/// HTTP music adapter.
pub struct HttpMusicProvider {
    config: ProviderConfig,
    retry: RetryConfig,
    bucket: TokenBucket,
    client: Client,
}

#[derive(Debug, Serialize)]
struct MusicApiRequest {
    model: String,
    prompt: String,
    duration_s: u32,
}

#[derive(Debug, Deserialize)]
struct MusicApiResponse {
    b64_audio: String,
}

impl HttpMusicProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .expect("Failed to create HTTP client");
        let bucket = TokenBucket::new(config.rate_per_minute, config.max_concurrency);
        Self {
            config,
            retry: RetryConfig::default(),
            bucket,
            client,
        }
    }

    async fn call_once(&self, body: &MusicApiRequest) -> Result<MusicApiResponse> {
        let url = format!("{}/v1/music/generations", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await?.json().await.map_err(Into::into)
    }
}

#[async_trait]
impl MusicProvider for HttpMusicProvider {
    async fn generate(&self, request: MusicRequest) -> Result<CapabilityOutput<Vec<u8>>> {
        let body = MusicApiRequest {
            model: self.config.model.clone(),
            prompt: request.style.clone(),
            duration_s: request.duration_s,
        };

        let _permit = self.bucket.acquire().await;
        let started = Instant::now();
        let response =
            retry_with_backoff(&self.retry, "music.generate", || self.call_once(&body)).await?;
        let duration = started.elapsed();

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(response.b64_audio.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(format!("music base64: {e}")))?;

        Ok(CapabilityOutput::new(bytes, USD_PER_TRACK, duration))
    }

    fn model_tag(&self) -> &str {
        &self.config.model
    }
}
