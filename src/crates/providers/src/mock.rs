//! Deterministic in-memory providers for tests.
//!
//! Mocks return stable payloads derived from their inputs so downstream
//! assertions (artifact counts, continuation chains, cost totals) are exact,
//! and can be scripted to fail with a fatal provider error.

use crate::error::{ProviderError, Result};
use crate::image::{ImageProvider, ImageRequest};
use crate::music::{MusicProvider, MusicRequest};
use crate::planner::{PlanRequest, PlannerProvider};
use crate::types::{CapabilityOutput, ProviderSet};
use crate::video::{VideoProvider, VideoRequest};
use async_trait::async_trait;
use domain::ModelRegistry;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Planner mock producing a valid spec for the requested duration.
pub struct MockPlannerProvider {
    /// Beat durations to emit; must sum to the request duration unless the
    /// test wants truncation behavior.
    beat_durations: Mutex<Option<Vec<u32>>>,
    fail_with: Mutex<Option<String>>,
    pub calls: AtomicU32,
}

impl MockPlannerProvider {
    pub fn new() -> Self {
        Self {
            beat_durations: Mutex::new(None),
            fail_with: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// Override the emitted beat durations.
    pub fn with_beat_durations(self, durations: Vec<u32>) -> Self {
        *self.beat_durations.lock() = Some(durations);
        self
    }

    /// Script a fatal failure for every call.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock() = Some(message.into());
        self
    }

    /// Greedy 10s/5s fill for a duration.
    fn default_durations(duration_s: u32) -> Vec<u32> {
        let mut durations = Vec::new();
        let mut remaining = duration_s;
        while remaining >= 10 {
            durations.push(10);
            remaining -= 10;
        }
        if remaining >= 5 {
            durations.push(5);
        }
        durations
    }
}

impl Default for MockPlannerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlannerProvider for MockPlannerProvider {
    async fn plan(&self, request: PlanRequest) -> Result<CapabilityOutput<serde_json::Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ProviderError::Fatal(message));
        }
        let durations = self
            .beat_durations
            .lock()
            .clone()
            .unwrap_or_else(|| Self::default_durations(request.duration_s));
        let mut beats = Vec::new();
        let mut start = 0u32;
        for (i, d) in durations.iter().enumerate() {
            beats.push(json!({
                "index": i,
                "start_s": start,
                "duration_s": d,
                "shot_type": if i == 0 { "wide" } else { "close_up" },
                "action": format!("beat {i} action"),
                "prompt": format!("beat {i}: {}", request.prompt),
            }));
            start += d;
        }
        let spec = json!({
            "duration_s": request.duration_s,
            "archetype": "product_showcase",
            "beats": beats,
            "style": {"palette": "warm", "mood": "upbeat"},
            "product": {"name": request.title.unwrap_or_else(|| "product".to_string())},
            "audio": {"music_style": "upbeat electronic"},
        });
        Ok(CapabilityOutput::new(spec, 0.03, Duration::from_millis(5)))
    }

    fn model_tag(&self) -> &str {
        "mock-planner"
    }
}

/// Image mock returning PNG-tagged bytes derived from the prompt.
pub struct MockImageProvider {
    fail_with: Mutex<Option<String>>,
    pub calls: AtomicU32,
}

impl MockImageProvider {
    pub fn new() -> Self {
        Self {
            fail_with: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock() = Some(message.into());
        self
    }
}

impl Default for MockImageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    async fn generate(&self, request: ImageRequest) -> Result<CapabilityOutput<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ProviderError::Fatal(message));
        }
        let mut bytes = b"PNG|".to_vec();
        bytes.extend_from_slice(request.prompt.as_bytes());
        Ok(CapabilityOutput::new(bytes, 0.04, Duration::from_millis(5)))
    }

    fn model_tag(&self) -> &str {
        "mock-image"
    }
}

/// Video mock whose payload embeds the init image, so continuation chains
/// are observable in the output bytes.
pub struct MockVideoProvider {
    /// Every request seen, in call order.
    pub requests: Mutex<Vec<VideoRequest>>,
    fail_with: Mutex<Option<String>>,
    pub calls: AtomicU32,
}

impl MockVideoProvider {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock() = Some(message.into());
        self
    }
}

impl Default for MockVideoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoProvider for MockVideoProvider {
    async fn generate(&self, request: VideoRequest) -> Result<CapabilityOutput<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ProviderError::Fatal(message));
        }
        let cost = ModelRegistry
            .require(&request.model_tag)
            .map(|m| m.usd_per_second * request.duration_s as f64)
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        let mut bytes = b"MP4|".to_vec();
        bytes.extend_from_slice(request.prompt.as_bytes());
        bytes.extend_from_slice(b"|init:");
        bytes.extend_from_slice(&request.init_image);
        self.requests.lock().push(request);
        Ok(CapabilityOutput::new(bytes, cost, Duration::from_millis(5)))
    }
}

/// Music mock.
pub struct MockMusicProvider {
    fail_with: Mutex<Option<String>>,
    pub calls: AtomicU32,
}

impl MockMusicProvider {
    pub fn new() -> Self {
        Self {
            fail_with: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock() = Some(message.into());
        self
    }
}

impl Default for MockMusicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicProvider for MockMusicProvider {
    async fn generate(&self, request: MusicRequest) -> Result<CapabilityOutput<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ProviderError::Fatal(message));
        }
        let mut bytes = b"MP3|".to_vec();
        bytes.extend_from_slice(request.style.as_bytes());
        Ok(CapabilityOutput::new(bytes, 0.10, Duration::from_millis(5)))
    }

    fn model_tag(&self) -> &str {
        "mock-music"
    }
}

/// A provider set wired entirely with default mocks.
pub fn mock_provider_set() -> ProviderSet {
    ProviderSet::new(
        Arc::new(MockPlannerProvider::new()),
        Arc::new(MockImageProvider::new()),
        Arc::new(MockVideoProvider::new()),
        Arc::new(MockMusicProvider::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_planner_emits_valid_spec() {
        let planner = MockPlannerProvider::new();
        let out = planner
            .plan(PlanRequest {
                prompt: "coffee ad".to_string(),
                title: None,
                duration_s: 30,
                reference_assets: vec![],
            })
            .await
            .unwrap();
        let spec = domain::VideoSpec::from_json(out.payload).unwrap();
        spec.validate().unwrap();
        assert_eq!(spec.beats_total_s(), 30);
    }

    #[tokio::test]
    async fn test_mock_video_embeds_init_image() {
        let video = MockVideoProvider::new();
        let out = video
            .generate(VideoRequest {
                prompt: "chunk 1".to_string(),
                init_image: b"FRAME".to_vec(),
                duration_s: 5,
                model_tag: "hailuo_fast".to_string(),
            })
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&out.payload);
        assert!(text.contains("init:FRAME"));
        assert!((out.cost_usd - 0.10).abs() < 1e-9);
        assert_eq!(video.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_mock_is_fatal() {
        let image = MockImageProvider::new().failing("quota_exceeded");
        let err = image
            .generate(ImageRequest {
                prompt: "p".to_string(),
                style_hint: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(m) if m.contains("quota")));
    }
}
