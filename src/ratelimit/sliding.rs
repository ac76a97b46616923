//! Sliding-window limiter variant.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

use super::backend::RateLimiterBackend;
use super::limiter::Verdict;

/// Per-key state for the sliding-window estimate.
struct SlidingBucket {
    /// Index of the current window (`now / window_ms`)
    window_index: u64,
    /// Admissions in the current window
    current: u32,
    /// Admissions in the previous window
    previous: u32,
    /// Last access time for idle eviction
    last_access_ms: u64,
}

/// Stricter-fairness alternative to the fixed-window [`super::RateLimiter`].
///
/// Estimates the request rate over a window that slides continuously: the
/// previous window's count decays linearly as the current window progresses,
/// so the full allowance never returns all at once and the fixed-window
/// double-burst across a boundary cannot happen. Same `admit` contract, but
/// deliberately not a drop-in replacement for callers that depend on the
/// boundary reset.
///
/// A zero-second window admits unconditionally (the decay weight is undefined
/// there), matching the fixed-window limiter's effectively-unlimited
/// behavior.
pub struct SlidingWindowLimiter {
    buckets: DashMap<String, Mutex<SlidingBucket>>,
    max_requests: u32,
    window_secs: u64,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Create a limiter on the system clock.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self::with_clock(max_requests, window_secs, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected clock.
    pub fn with_clock(max_requests: u32, window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            max_requests,
            window_secs,
            clock,
        }
    }

    /// Number of keys currently tracked.
    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimiterBackend for SlidingWindowLimiter {
    fn admit(&self, key: &str) -> Verdict {
        let now = self.clock.now_millis();
        let window_ms = self.window_secs * 1000;
        if window_ms == 0 {
            return Verdict::allow();
        }

        let entry = self.buckets.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "Creating sliding window bucket");
            Mutex::new(SlidingBucket {
                window_index: now / window_ms,
                current: 0,
                previous: 0,
                last_access_ms: now,
            })
        });
        let mut bucket = entry.lock();
        bucket.last_access_ms = now;

        let index = now / window_ms;
        if index > bucket.window_index {
            bucket.previous = if index == bucket.window_index + 1 {
                bucket.current
            } else {
                0
            };
            bucket.current = 0;
            bucket.window_index = index;
        }

        // Weight the previous window by how much of it still overlaps the
        // sliding window ending now.
        let elapsed_fraction = (now % window_ms) as f64 / window_ms as f64;
        let weighted =
            f64::from(bucket.previous) * (1.0 - elapsed_fraction) + f64::from(bucket.current);

        if weighted < f64::from(self.max_requests) {
            bucket.current += 1;
            Verdict::allow()
        } else {
            let remaining_ms = window_ms - (now % window_ms);
            debug!(key = %key, "Rate limit exceeded (sliding window)");
            Verdict::deny(remaining_ms.div_ceil(1000))
        }
    }

    fn max_requests(&self) -> u32 {
        self.max_requests
    }

    fn window_secs(&self) -> u64 {
        self.window_secs
    }

    fn sweep_idle(&self, ttl_ms: u64) -> usize {
        let now = self.clock.now_millis();
        // Counted inside the closure: concurrent inserts make before/after
        // length arithmetic unreliable.
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            let keep = now.saturating_sub(bucket.get_mut().last_access_ms) < ttl_ms;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }
}
