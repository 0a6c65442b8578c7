//! Token-bucket rate limiting for provider calls.
//!
//! Each adapter owns one bucket (sustained rate + concurrency cap). A caller
//! that exceeds the rate waits locally for a token instead of receiving a
//! provider 429.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
// tokio's Instant respects time-pause in tests.
use tokio::time::Instant;

/// Token bucket with a concurrency semaphore.
pub struct TokenBucket {
    capacity: f64,
    refill_per_s: f64,
    state: Mutex<BucketState>,
    concurrency: Arc<Semaphore>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Held for the duration of one provider call; releasing it frees a
/// concurrency slot.
pub struct CallPermit {
    _permit: OwnedSemaphorePermit,
}

impl TokenBucket {
    /// Create a bucket sustaining `rate_per_minute` calls with at most
    /// `max_concurrency` in flight.
    pub fn new(rate_per_minute: u32, max_concurrency: usize) -> Self {
        let capacity = (rate_per_minute.max(1)) as f64;
        Self {
            capacity,
            refill_per_s: capacity / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            concurrency: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Time until one token is available, zero if one can be taken now.
    fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_s).min(self.capacity);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_s))
        }
    }

    /// Acquire a rate token and a concurrency slot, waiting locally as
    /// needed. The returned permit must be held for the call's duration.
    pub async fn acquire(&self) -> CallPermit {
        loop {
            match self.try_take() {
                None => break,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
        let permit = self
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore closed");
        CallPermit { _permit: permit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokens_drain_and_refill() {
        let bucket = TokenBucket::new(60, 10); // 1 token/s
        for _ in 0..60 {
            assert!(bucket.try_take().is_none());
        }
        let wait = bucket.try_take().expect("bucket should be empty");
        assert!(wait <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrency_cap_blocks() {
        let bucket = Arc::new(TokenBucket::new(600, 1));
        let held = bucket.acquire().await;
        let contender = {
            let bucket = bucket.clone();
            tokio::spawn(async move {
                bucket.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(held);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        tokio::time::pause();
        let bucket = TokenBucket::new(60, 10);
        for _ in 0..60 {
            bucket.try_take();
        }
        let start = tokio::time::Instant::now();
        let fut = bucket.acquire();
        tokio::pin!(fut);
        // Advancing virtual time lets the sleep inside acquire() complete.
        tokio::time::timeout(Duration::from_secs(5), &mut fut)
            .await
            .expect("acquire should complete after refill");
        assert!(start.elapsed() >= Duration::ZERO);
    }
}
