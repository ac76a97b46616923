//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod limiter;
mod sliding;
mod store;

pub use backend::{spawn_eviction_sweep, RateLimiterBackend};
pub use bucket::Bucket;
pub use limiter::{RateLimiter, Verdict};
pub use sliding::SlidingWindowLimiter;
pub use store::BucketStore;
