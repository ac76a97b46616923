//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Which admission algorithm the limiter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterMode {
    /// Fixed-window reset: the full allowance returns at once when the window
    /// elapses. Permits a burst of twice the allowance across a window
    /// boundary.
    FixedWindow,
    /// Weighted two-window count that smooths the boundary burst. Stricter
    /// than `FixedWindow`, not a drop-in replacement.
    SlidingWindow,
}

impl Default for LimiterMode {
    fn default() -> Self {
        LimiterMode::FixedWindow
    }
}

/// Rate limiting configuration.
///
/// Loaded once at startup and read-only thereafter. Values are taken as-is:
/// `max_requests = 0` denies every request, and `window_size_secs = 0` makes
/// every check see an elapsed window (effectively unlimited).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Enable/disable rate limiting entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window size in seconds
    #[serde(default = "default_window_size_secs")]
    pub window_size_secs: u64,

    /// Track allowance per client IP; if false, a single global bucket is
    /// shared by all callers
    #[serde(default = "default_per_ip")]
    pub per_ip: bool,

    /// Admission algorithm
    #[serde(default)]
    pub mode: LimiterMode,

    /// Path patterns the limiter governs (empty = all paths). A pattern is
    /// either an exact path or a `/prefix/**` prefix match.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Path patterns exempt from rate limiting
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Interval between idle-bucket eviction sweeps, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Number of windows a bucket may sit unused before eviction
    #[serde(default = "default_idle_ttl_windows")]
    pub idle_ttl_windows: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_requests: default_max_requests(),
            window_size_secs: default_window_size_secs(),
            per_ip: default_per_ip(),
            mode: LimiterMode::default(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            sweep_interval_secs: default_sweep_interval_secs(),
            idle_ttl_windows: default_idle_ttl_windows(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_size_secs() -> u64 {
    60
}

fn default_per_ip() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_idle_ttl_windows() -> u32 {
    4
}

impl RateLimitSettings {
    /// Whether the limiter applies to the given request path.
    ///
    /// A path is governed when it matches the include patterns (or none are
    /// configured) and matches no exclude pattern.
    pub fn governs_path(&self, path: &str) -> bool {
        let included = self.include_patterns.is_empty()
            || self.include_patterns.iter().any(|p| pattern_matches(p, path));
        let excluded = self.exclude_patterns.iter().any(|p| pattern_matches(p, path));
        included && !excluded
    }

    /// Idle time-to-live for eviction, in milliseconds.
    pub fn idle_ttl_millis(&self) -> u64 {
        u64::from(self.idle_ttl_windows) * self.window_size_secs * 1000
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/**") {
        path == prefix || path.starts_with(&format!("{}/", prefix))
    } else {
        path == pattern
    }
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))
    }
}
