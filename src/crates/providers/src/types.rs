//! Shared request/response types for capability calls.

use crate::image::ImageProvider;
use crate::music::MusicProvider;
use crate::planner::PlannerProvider;
use crate::video::VideoProvider;
use std::sync::Arc;
use std::time::Duration;

/// The uniform result of any capability call.
#[derive(Debug, Clone)]
pub struct CapabilityOutput<T> {
    pub payload: T,
    /// What the provider charged for this call, USD.
    pub cost_usd: f64,
    /// Wall-clock duration of the call.
    pub duration: Duration,
}

impl<T> CapabilityOutput<T> {
    pub fn new(payload: T, cost_usd: f64, duration: Duration) -> Self {
        Self {
            payload,
            cost_usd,
            duration,
        }
    }

    /// Map the payload, keeping cost and duration.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CapabilityOutput<U> {
        CapabilityOutput {
            payload: f(self.payload),
            cost_usd: self.cost_usd,
            duration: self.duration,
        }
    }
}

/// The full set of capability adapters, injected once at process start.
#[derive(Clone)]
pub struct ProviderSet {
    pub planner: Arc<dyn PlannerProvider>,
    pub image: Arc<dyn ImageProvider>,
    pub video: Arc<dyn VideoProvider>,
    pub music: Arc<dyn MusicProvider>,
}

impl ProviderSet {
    pub fn new(
        planner: Arc<dyn PlannerProvider>,
        image: Arc<dyn ImageProvider>,
        video: Arc<dyn VideoProvider>,
        music: Arc<dyn MusicProvider>,
    ) -> Self {
        Self {
            planner,
            image,
            video,
            music,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_output_map_preserves_accounting() {
        let out = CapabilityOutput::new(vec![1u8, 2, 3], 0.25, Duration::from_secs(2));
        let mapped = out.map(|bytes| bytes.len());
        assert_eq!(mapped.payload, 3);
        assert_eq!(mapped.cost_usd, 0.25);
        assert_eq!(mapped.duration, Duration::from_secs(2));
    }
}
