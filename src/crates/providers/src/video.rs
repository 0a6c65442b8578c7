//! Video capability: chunk generation seeded from an init image.
//!
//! Every call renders one chunk. The init image is either a storyboard frame
//! (reference chunk) or the last frame of the preceding chunk (continuation
//! chunk); the adapter does not distinguish the two.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::planner::check_status;
use crate::rate_limit::TokenBucket;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::CapabilityOutput;
use async_trait::async_trait;
use base64::Engine;
use domain::ModelRegistry;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A chunk generation request.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    /// PNG init image the chunk is conditioned on.
    pub init_image: Vec<u8>,
    /// Chunk duration, seconds.
    pub duration_s: u32,
    /// Video model tag from the registry.
    pub model_tag: String,
}

/// The video generation capability.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Generate one MP4 chunk.
    async fn generate(&self, request: VideoRequest) -> Result<CapabilityOutput<Vec<u8>>>;
}

/// HTTP video adapter.
pub struct HttpVideoProvider {
    config: ProviderConfig,
    retry: RetryConfig,
    bucket: TokenBucket,
    client: Client,
}

#[derive(Debug, Serialize)]
struct VideoApiRequest {
    model: String,
    prompt: String,
    duration_s: u32,
    init_image_b64: String,
}

#[derive(Debug, Deserialize)]
struct VideoApiResponse {
    b64_video: String,
}

impl HttpVideoProvider {
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

    async fn call_once(&self, body: &VideoApiRequest) -> Result<VideoApiResponse> {
        let url = format!("{}/v1/videos/generations", self.config.base_url);
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
impl VideoProvider for HttpVideoProvider {
    async fn generate(&self, request: VideoRequest) -> Result<CapabilityOutput<Vec<u8>>> {
        let model = ModelRegistry
            .require(&request.model_tag)
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        let body = VideoApiRequest {
            model: request.model_tag.clone(),
            prompt: request.prompt.clone(),
            duration_s: request.duration_s,
            init_image_b64: base64::engine::general_purpose::STANDARD
                .encode(&request.init_image),
        };

        let _permit = self.bucket.acquire().await;
        let started = Instant::now();
        let response =
            retry_with_backoff(&self.retry, "video.generate", || self.call_once(&body)).await?;
        let duration = started.elapsed();

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(response.b64_video.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(format!("video base64: {e}")))?;

        let cost_usd = model.usd_per_second * request.duration_s as f64;
        Ok(CapabilityOutput::new(bytes, cost_usd, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_model_tag_is_config_error() {
        let provider = HttpVideoProvider::new(ProviderConfig {
            base_url: "https://video.invalid".to_string(),
            api_key: "k".to_string(),
            model: "ignored".to_string(),
            timeout_s: 5,
            rate_per_minute: 60,
            max_concurrency: 2,
        });
        let err = provider
            .generate(VideoRequest {
                prompt: "p".to_string(),
                init_image: vec![0u8; 4],
                duration_s: 5,
                model_tag: "sora_ultra".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }
}
