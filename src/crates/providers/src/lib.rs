//! Capability adapters over the generative providers used by adforge.
//!
//! Four capabilities back the pipeline: the planner (an LLM), the image
//! generator, the video generator and the music generator. Each adapter
//! exposes one async call that yields `(payload, cost_usd, duration)` or a
//! typed error, with retries and token-bucket rate limiting handled inside
//! the adapter so callers never see a raw 429.

pub mod config;
pub mod error;
pub mod image;
pub mod mock;
pub mod music;
pub mod planner;
pub mod rate_limit;
pub mod retry;
pub mod types;
pub mod video;

pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use image::{HttpImageProvider, ImageProvider, ImageRequest};
pub use music::{HttpMusicProvider, MusicProvider, MusicRequest};
pub use planner::{HttpPlannerProvider, PlanRequest, PlannerProvider};
pub use rate_limit::TokenBucket;
pub use retry::{retry_with_backoff, RetryConfig};
pub use types::{CapabilityOutput, ProviderSet};
pub use video::{HttpVideoProvider, VideoProvider, VideoRequest};
