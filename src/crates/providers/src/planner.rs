//! Planner capability: an LLM that writes the video spec.
//!
//! The planner is instructed to pick one archetype from the closed library,
//! compose beats from the beat library (durations 5/10/15 only) and write a
//! generation prompt per beat. The adapter returns the raw spec JSON; typed
//! validation happens in the planning stage.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::rate_limit::TokenBucket;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::CapabilityOutput;
use async_trait::async_trait;
use domain::{ArchetypeLibrary, BeatLibrary};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// USD per 1k input tokens.
const USD_PER_1K_INPUT: f64 = 0.003;
/// USD per 1k output tokens.
const USD_PER_1K_OUTPUT: f64 = 0.015;

/// A planning request.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// The user's advertisement prompt.
    pub prompt: String,
    /// Optional title for the ad.
    pub title: Option<String>,
    /// Target video duration, seconds.
    pub duration_s: u32,
    /// Ids of uploaded reference assets, mentioned to the planner.
    pub reference_assets: Vec<String>,
}

/// The planner capability.
#[async_trait]
pub trait PlannerProvider: Send + Sync {
    /// Produce the spec JSON for a request.
    async fn plan(&self, request: PlanRequest) -> Result<CapabilityOutput<serde_json::Value>>;

    /// Model tag recorded on produced artifacts.
    fn model_tag(&self) -> &str;
}

/// HTTP planner adapter over a messages-style LLM API.
pub struct HttpPlannerProvider {
    config: ProviderConfig,
    retry: RetryConfig,
    bucket: TokenBucket,
    client: Client,
}

#[derive(Debug, Serialize)]
struct PlannerApiRequest {
    model: String,
    system: String,
    messages: Vec<PlannerMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct PlannerMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct PlannerApiResponse {
    content: Vec<PlannerContentBlock>,
    usage: PlannerUsage,
}

#[derive(Debug, Deserialize)]
struct PlannerContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlannerUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl HttpPlannerProvider {
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

    /// System instruction embedding the closed libraries.
    fn system_prompt(&self) -> String {
        format!(
            "You are an advertisement video planner. Respond with a single JSON \
             object and nothing else.\n\n\
             Pick exactly one archetype from:\n{}\n\n\
             Compose beats using only these shot types:\n{}\n\n\
             Every beat duration must be 5, 10 or 15 seconds. Beat durations \
             must sum to the requested video duration. Each beat needs an \
             index, start_s, duration_s, shot_type, action and an image \
             generation prompt. The top-level object has duration_s, \
             archetype, beats, style, product and audio fields.",
            ArchetypeLibrary.prompt_listing(),
            BeatLibrary.prompt_listing(),
        )
    }

    fn user_prompt(&self, request: &PlanRequest) -> String {
        let mut parts = vec![format!(
            "Plan a {}-second advertisement video.",
            request.duration_s
        )];
        if let Some(title) = &request.title {
            parts.push(format!("Title: {title}"));
        }
        parts.push(format!("Brief: {}", request.prompt));
        if !request.reference_assets.is_empty() {
            parts.push(format!(
                "Reference assets available: {}",
                request.reference_assets.join(", ")
            ));
        }
        parts.join("\n")
    }

    async fn call_once(&self, body: &PlannerApiRequest) -> Result<PlannerApiResponse> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await?.json().await.map_err(Into::into)
    }
}

/// Map HTTP status classes onto the provider error taxonomy.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 429 {
        Err(ProviderError::RateLimited(body))
    } else if status.is_server_error() {
        Err(ProviderError::ServiceUnavailable(format!("{status}: {body}")))
    } else {
        Err(ProviderError::Fatal(format!("{status}: {body}")))
    }
}

#[async_trait]
impl PlannerProvider for HttpPlannerProvider {
    async fn plan(&self, request: PlanRequest) -> Result<CapabilityOutput<serde_json::Value>> {
        let body = PlannerApiRequest {
            model: self.config.model.clone(),
            system: self.system_prompt(),
            messages: vec![PlannerMessage {
                role: "user".to_string(),
                content: self.user_prompt(&request),
            }],
            max_tokens: 4096,
        };

        let _permit = self.bucket.acquire().await;
        let started = Instant::now();
        let response =
            retry_with_backoff(&self.retry, "planner.plan", || self.call_once(&body)).await?;
        let duration = started.elapsed();

        let text = response
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let spec_json: serde_json::Value = serde_json::from_str(text.trim())
            .map_err(|e| ProviderError::InvalidResponse(format!("planner JSON: {e}")))?;

        let cost_usd = response.usage.input_tokens as f64 / 1000.0 * USD_PER_1K_INPUT
            + response.usage.output_tokens as f64 / 1000.0 * USD_PER_1K_OUTPUT;

        Ok(CapabilityOutput::new(spec_json, cost_usd, duration))
    }

    fn model_tag(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HttpPlannerProvider {
        HttpPlannerProvider::new(ProviderConfig {
            base_url: "https://planner.invalid".to_string(),
            api_key: "test-key".to_string(),
            model: "planner-large".to_string(),
            timeout_s: 5,
            rate_per_minute: 60,
            max_concurrency: 2,
        })
    }

    #[test]
    fn test_system_prompt_embeds_libraries() {
        let prompt = provider().system_prompt();
        assert!(prompt.contains("product_showcase"));
        assert!(prompt.contains("close_up"));
        assert!(prompt.contains("5, 10 or 15"));
    }

    #[test]
    fn test_user_prompt_mentions_inputs() {
        let prompt = provider().user_prompt(&PlanRequest {
            prompt: "coffee that wakes you up".to_string(),
            title: Some("Morning Rocket".to_string()),
            duration_s: 30,
            reference_assets: vec!["asset-1".to_string()],
        });
        assert!(prompt.contains("30-second"));
        assert!(prompt.contains("Morning Rocket"));
        assert!(prompt.contains("coffee that wakes you up"));
        assert!(prompt.contains("asset-1"));
    }
}
