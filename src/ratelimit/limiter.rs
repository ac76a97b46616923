//! Core fixed-window rate limiter.

use std::sync::Arc;

use tracing::debug;

use crate::clock::{Clock, SystemClock};

use super::backend::RateLimiterBackend;
use super::store::BucketStore;

/// Outcome of a single admission check.
///
/// Denial is an expected outcome, not a failure: callers get a retry hint
/// instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Seconds until a denied caller should retry (0 when allowed)
    pub retry_after_secs: u64,
}

impl Verdict {
    /// An admitting verdict.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    /// A denying verdict with a retry hint.
    pub fn deny(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs,
        }
    }
}

/// Fixed-window rate limiter.
///
/// Each key gets `max_requests` admissions per window; the full allowance
/// returns at once when the window elapses. This mirrors the classic
/// fixed-window reset, including its boundary artifact: a caller can burst
/// `2 × max_requests` across a window boundary. `window_secs = 0` makes every
/// check see an elapsed window, which is effectively unlimited.
///
/// Thread-safe and lock-free; `admit` never blocks, sleeps, or awaits.
pub struct RateLimiter {
    store: BucketStore,
    max_requests: u32,
    window_secs: u64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self::with_clock(max_requests, window_secs, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected clock.
    pub fn with_clock(max_requests: u32, window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: BucketStore::new(max_requests),
            max_requests,
            window_secs,
            clock,
        }
    }

    /// Tokens left for `key` right now, with the full allowance for a
    /// never-seen key.
    ///
    /// Read-only: does not create a bucket or delay its eviction.
    pub fn remaining(&self, key: &str) -> u32 {
        match self.store.get(key) {
            Some(bucket) => {
                let now = self.clock.now_millis();
                bucket.refill_if_window_elapsed(now, self.window_secs * 1000);
                bucket.remaining()
            }
            None => self.max_requests,
        }
    }

    /// Number of keys currently tracked.
    pub fn key_count(&self) -> usize {
        self.store.len()
    }
}

impl RateLimiterBackend for RateLimiter {
    fn admit(&self, key: &str) -> Verdict {
        let now = self.clock.now_millis();
        let bucket = self.store.get_or_create(key, now);
        bucket.refill_if_window_elapsed(now, self.window_secs * 1000);

        if bucket.try_consume() {
            Verdict::allow()
        } else {
            let retry_after_secs = bucket.retry_after_secs(now, self.window_secs);
            debug!(
                key = %key,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            Verdict::deny(retry_after_secs)
        }
    }

    fn max_requests(&self) -> u32 {
        self.max_requests
    }

    fn window_secs(&self) -> u64 {
        self.window_secs
    }

    fn sweep_idle(&self, ttl_ms: u64) -> usize {
        self.store.evict_idle(self.clock.now_millis(), ttl_ms)
    }
}
