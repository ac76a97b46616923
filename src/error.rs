//! Error types for the Floodgate service.

use thiserror::Error;

/// Main error type for Floodgate operations.
///
/// Note that an ordinary rate-limit denial is not an error inside the core:
/// [`crate::ratelimit::Verdict`] carries it as a first-class outcome. The
/// `RateLimited` variant exists only at the HTTP boundary, where a denial is
/// rendered as a 429 response.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was denied by the rate limiter
    #[error("Rate limit exceeded. Maximum {max_requests} requests per {window_secs} seconds")]
    RateLimited {
        /// Allowance per window
        max_requests: u32,
        /// Window size in seconds
        window_secs: u64,
        /// Seconds until the caller may retry
        retry_after_secs: u64,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
