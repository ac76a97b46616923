//! Rate limiter trait for abstracting the admission algorithm.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::limiter::Verdict;

/// Trait for rate limiter implementations.
///
/// Abstracts over the fixed-window [`super::RateLimiter`] and the
/// stricter-fairness [`super::SlidingWindowLimiter`] so the HTTP layer can
/// work with either. Implementations must be safe for unbounded concurrent
/// callers, and `admit` must never block, sleep, or await.
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether a request under `key` may proceed.
    fn admit(&self, key: &str) -> Verdict;

    /// Allowance per window.
    fn max_requests(&self) -> u32;

    /// Window size in seconds.
    fn window_secs(&self) -> u64;

    /// Drop per-key state that has been idle longer than `ttl_ms`.
    ///
    /// Returns the number of entries removed.
    fn sweep_idle(&self, ttl_ms: u64) -> usize;
}

/// Spawn the background task that evicts idle buckets.
///
/// Runs on its own schedule, independent of request handling; active keys are
/// untouched as long as `ttl_ms` spans several windows.
pub fn spawn_eviction_sweep(
    limiter: Arc<dyn RateLimiterBackend>,
    interval: Duration,
    ttl_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh process does
        // not sweep an empty map.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = limiter.sweep_idle(ttl_ms);
            if evicted > 0 {
                debug!(evicted = evicted, "Evicted idle rate limit buckets");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::RateLimiter;

    #[tokio::test]
    async fn test_eviction_sweep_runs_periodically() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter: Arc<RateLimiter> =
            Arc::new(RateLimiter::with_clock(5, 60, clock.clone()));

        limiter.admit("idle");
        clock.advance_secs(600);

        let handle = spawn_eviction_sweep(
            limiter.clone() as Arc<dyn RateLimiterBackend>,
            Duration::from_millis(10),
            240_000,
        );

        // Give the sweep a couple of intervals to fire
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(limiter.key_count(), 0);
    }
}
