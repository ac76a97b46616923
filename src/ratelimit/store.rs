//! Concurrent bucket storage.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::bucket::Bucket;

/// Concurrent mapping from rate-limit key to its [`Bucket`].
///
/// Backed by a sharded map, so lookups for unrelated keys never serialize on
/// a single lock and creation is insert-if-absent: two racers on a never-seen
/// key always end up sharing one bucket.
pub struct BucketStore {
    buckets: DashMap<String, Arc<Bucket>>,
    capacity: u32,
}

impl BucketStore {
    /// Create an empty store whose buckets hold `capacity` tokens per window.
    pub fn new(capacity: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
        }
    }

    /// Return the bucket for `key`, creating a full one if absent.
    ///
    /// Also records the access time for idle eviction.
    pub fn get_or_create(&self, key: &str, now_ms: u64) -> Arc<Bucket> {
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, capacity = self.capacity, "Creating rate limit bucket");
                Arc::new(Bucket::new(self.capacity, now_ms))
            })
            .clone();
        bucket.touch(now_ms);
        bucket
    }

    /// Return the bucket for `key` if one exists, without creating one or
    /// recording an access.
    pub fn get(&self, key: &str) -> Option<Arc<Bucket>> {
        self.buckets.get(key).map(|bucket| bucket.clone())
    }

    /// Remove buckets that have not been accessed within `ttl_ms`.
    ///
    /// Returns the number of buckets removed. Callers pass a TTL spanning
    /// several windows, so an active key never loses its bucket mid-window.
    pub fn evict_idle(&self, now_ms: u64, ttl_ms: u64) -> usize {
        // Counted inside the closure: concurrent inserts make before/after
        // length arithmetic unreliable.
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            let keep = now_ms.saturating_sub(bucket.last_access_ms()) < ttl_ms;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the store tracks no keys.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
