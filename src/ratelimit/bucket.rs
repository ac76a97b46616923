//! Per-key allowance state.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Counter state for a single rate-limit key.
///
/// All fields are updated with lock-free atomic operations so a bucket can be
/// hammered by any number of concurrent admission checks. Invariants:
/// `remaining` stays within `[0, capacity]`, and `window_start_ms` only ever
/// moves forward.
pub struct Bucket {
    /// Admissions allowed per window
    capacity: u32,
    /// Tokens currently available
    remaining: AtomicU32,
    /// Start of the current window, milliseconds since epoch
    window_start_ms: AtomicU64,
    /// Last time this bucket was looked up, for idle eviction
    last_access_ms: AtomicU64,
}

impl Bucket {
    /// Create a fresh bucket with a full allowance.
    pub fn new(capacity: u32, now_ms: u64) -> Self {
        Self {
            capacity,
            remaining: AtomicU32::new(capacity),
            window_start_ms: AtomicU64::new(now_ms),
            last_access_ms: AtomicU64::new(now_ms),
        }
    }

    /// Reset the allowance if the current window has elapsed.
    ///
    /// Concurrent callers may all observe the elapsed window, but only the
    /// one that wins the compare-and-swap on `window_start_ms` performs the
    /// reset, so `remaining` ends at exactly `capacity` per elapse.
    pub fn refill_if_window_elapsed(&self, now_ms: u64, window_ms: u64) {
        let started = self.window_start_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(started) >= window_ms
            && self
                .window_start_ms
                .compare_exchange(started, now_ms, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            self.remaining.store(self.capacity, Ordering::SeqCst);
        }
    }

    /// Atomically take one token if any are available.
    ///
    /// Uses a compare-and-swap loop so that with N callers racing at
    /// `remaining = 1`, exactly one succeeds.
    pub fn try_consume(&self) -> bool {
        let mut current = self.remaining.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return false;
            }
            match self.remaining.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Seconds until the current window elapses and the allowance returns.
    pub fn retry_after_secs(&self, now_ms: u64, window_secs: u64) -> u64 {
        let started = self.window_start_ms.load(Ordering::SeqCst);
        let elapsed_secs = now_ms.saturating_sub(started) / 1000;
        window_secs.saturating_sub(elapsed_secs)
    }

    /// Tokens currently available.
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Start of the current window, milliseconds since epoch.
    pub fn window_start_ms(&self) -> u64 {
        self.window_start_ms.load(Ordering::SeqCst)
    }

    /// Record an access for eviction bookkeeping.
    pub fn touch(&self, now_ms: u64) {
        self.last_access_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Last access time, milliseconds since epoch.
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::SeqCst)
    }
}
