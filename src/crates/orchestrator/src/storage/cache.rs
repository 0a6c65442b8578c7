//! Live job state cache with per-job change notification.
//!
//! The cache is the authoritative source for "live" status reads; the
//! durable store catches up via write-behind. Entries carry a TTL refreshed
//! on every update. Each job has a broadcast topic carrying opaque "changed"
//! pings; subscribers re-read the snapshot on every ping.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process state cache + pub/sub.
pub struct StateCache {
    entries: DashMap<String, CacheEntry>,
    topics: DashMap<String, broadcast::Sender<()>>,
    ttl: Duration,
}

impl StateCache {
    /// Cache with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            topics: DashMap::new(),
            ttl,
        }
    }

    /// Cache with the production TTL of one hour.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(3_600))
    }

    /// Read a live entry; expired entries read as absent and are dropped.
    pub fn get(&self, job_id: &str) -> Option<serde_json::Value> {
        let expired = match self.entries.get(job_id) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(job_id);
        }
        None
    }

    /// Write an entry, refreshing its TTL.
    pub fn put(&self, job_id: &str, value: serde_json::Value) {
        self.entries.insert(
            job_id.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop an entry (job deleted).
    pub fn remove(&self, job_id: &str) {
        self.entries.remove(job_id);
        self.topics.remove(job_id);
    }

    /// Subscribe to a job's change topic.
    pub fn subscribe(&self, job_id: &str) -> broadcast::Receiver<()> {
        self.topics
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish a change ping; a ping with no subscribers is dropped.
    pub fn publish(&self, job_id: &str) {
        if let Some(sender) = self.topics.get(job_id) {
            let _ = sender.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_roundtrip() {
        let cache = StateCache::with_default_ttl();
        cache.put("job-1", json!({"status": "queued"}));
        assert_eq!(cache.get("job-1").unwrap()["status"], "queued");
        assert!(cache.get("job-2").is_none());
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let cache = StateCache::new(Duration::from_millis(0));
        cache.put("job-1", json!({"status": "queued"}));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("job-1").is_none());
    }

    #[test]
    fn test_put_refreshes_ttl() {
        let cache = StateCache::new(Duration::from_secs(60));
        cache.put("job-1", json!(1));
        cache.put("job-1", json!(2));
        assert_eq!(cache.get("job-1").unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let cache = StateCache::with_default_ttl();
        let mut rx = cache.subscribe("job-1");
        cache.publish("job-1");
        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let cache = StateCache::with_default_ttl();
        cache.publish("job-ghost");
    }

    #[tokio::test]
    async fn test_remove_clears_state() {
        let cache = StateCache::with_default_ttl();
        cache.put("job-1", json!(1));
        cache.remove("job-1");
        assert!(cache.get("job-1").is_none());
    }
}
