//! Image capability: storyboard frame generation.

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

/// Flat price per generated image, USD.
const USD_PER_IMAGE: f64 = 0.04;

/// An image generation request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    /// Optional style suffix appended to the prompt.
    pub style_hint: Option<String>,
}

/// The image generation capability.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one PNG image.
    async fn generate(&self, request: ImageRequest) -> Result<CapabilityOutput<Vec<u8>>>;

    fn model_tag(&self) -> &str;
}

/// HTTP image adapter.
pub struct HttpImageProvider {
    config: ProviderConfig,
    retry: RetryConfig,
    bucket: TokenBucket,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ImageApiRequest {
    model: String,
    prompt: String,
    size: String,
    response_format: String,
}

#[derive(Debug, Deserialize)]
struct ImageApiResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    b64_json: String,
}

impl HttpImageProvider {
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

    fn full_prompt(request: &ImageRequest) -> String {
        match &request.style_hint {
            Some(style) => format!("{}, {}", request.prompt, style),
            None => request.prompt.clone(),
        }
    }

    async fn call_once(&self, body: &ImageApiRequest) -> Result<ImageApiResponse> {
        let url = format!("{}/v1/images/generations", self.config.base_url);
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
impl ImageProvider for HttpImageProvider {
    async fn generate(&self, request: ImageRequest) -> Result<CapabilityOutput<Vec<u8>>> {
        let body = ImageApiRequest {
            model: self.config.model.clone(),
            prompt: Self::full_prompt(&request),
            size: "1280x720".to_string(),
            response_format: "b64_json".to_string(),
        };

        let _permit = self.bucket.acquire().await;
        let started = Instant::now();
        let response =
            retry_with_backoff(&self.retry, "image.generate", || self.call_once(&body)).await?;
        let duration = started.elapsed();

        let datum = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("empty image data".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(datum.b64_json.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(format!("image base64: {e}")))?;

        Ok(CapabilityOutput::new(bytes, USD_PER_IMAGE, duration))
    }

    fn model_tag(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_prompt_appends_style() {
        let with_style = HttpImageProvider::full_prompt(&ImageRequest {
            prompt: "a coffee cup".to_string(),
            style_hint: Some("warm morning light".to_string()),
        });
        assert_eq!(with_style, "a coffee cup, warm morning light");

        let bare = HttpImageProvider::full_prompt(&ImageRequest {
            prompt: "a coffee cup".to_string(),
            style_hint: None,
        });
        assert_eq!(bare, "a coffee cup");
    }
}
