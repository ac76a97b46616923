//! Governance middleware: adapts HTTP requests to limiter keys and limiter
//! verdicts to HTTP responses.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{instrument, warn};

use crate::config::RateLimitSettings;
use crate::error::FloodgateError;
use crate::ratelimit::{RateLimiterBackend, Verdict};

/// Shared state for the governance middleware and the service handlers.
pub struct Governance {
    limiter: Arc<dyn RateLimiterBackend>,
    settings: RateLimitSettings,
}

impl Governance {
    /// Create the governance state from loaded settings and a limiter.
    pub fn new(settings: RateLimitSettings, limiter: Arc<dyn RateLimiterBackend>) -> Self {
        Self { limiter, settings }
    }

    /// The limiter backing this middleware.
    pub fn limiter(&self) -> &Arc<dyn RateLimiterBackend> {
        &self.limiter
    }

    /// The rate limiting settings in effect.
    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Derive the rate-limit key for a request.
    ///
    /// Per-IP mode resolves the caller identity from forwarding headers with
    /// a fallback to the peer address; otherwise every caller shares the
    /// `"global"` key.
    pub fn rate_limit_key(&self, headers: &HeaderMap, peer: SocketAddr) -> String {
        if self.settings.per_ip {
            client_ip(headers, peer)
        } else {
            "global".to_string()
        }
    }

    /// Run an admission check for a request.
    pub fn check(&self, headers: &HeaderMap, peer: SocketAddr) -> Verdict {
        let key = self.rate_limit_key(headers, peer);
        self.limiter.admit(&key)
    }
}

/// Resolve the client IP for a request.
///
/// Takes the first comma-separated entry of `X-Forwarded-For` when it is
/// non-empty and not the literal `unknown`, then `X-Real-IP` under the same
/// rule, then the direct peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    header_ip(headers, "x-forwarded-for")
        .or_else(|| header_ip(headers, "x-real-ip"))
        .unwrap_or_else(|| peer.ip().to_string())
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() || first.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(first.to_string())
    }
}

/// axum middleware enforcing the configured rate limit.
///
/// Governed requests pass through with `X-RateLimit-Limit` and
/// `X-RateLimit-Window` response headers attached; denied requests
/// short-circuit into a 429 with a `Retry-After` header. Disabled
/// configuration or a non-governed path passes the request through untouched.
/// Admission is a single in-memory read-modify-write; this function never
/// sleeps.
#[instrument(skip_all, fields(path = %request.uri().path(), peer = %peer))]
pub async fn govern(
    State(governance): State<Arc<Governance>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let settings = governance.settings();
    if !settings.enabled || !settings.governs_path(request.uri().path()) {
        return next.run(request).await;
    }

    let key = governance.rate_limit_key(request.headers(), peer);
    let verdict = governance.limiter().admit(&key);

    if verdict.allowed {
        let mut response = next.run(request).await;
        attach_limit_headers(
            response.headers_mut(),
            governance.limiter().max_requests(),
            governance.limiter().window_secs(),
        );
        response
    } else {
        warn!(
            key = %key,
            retry_after_secs = verdict.retry_after_secs,
            "Rate limit exceeded for key"
        );
        FloodgateError::RateLimited {
            max_requests: governance.limiter().max_requests(),
            window_secs: governance.limiter().window_secs(),
            retry_after_secs: verdict.retry_after_secs,
        }
        .into_response()
    }
}

fn attach_limit_headers(headers: &mut HeaderMap, max_requests: u32, window_secs: u64) {
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(max_requests),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-window"),
        HeaderValue::from(window_secs),
    );
}

impl IntoResponse for FloodgateError {
    fn into_response(self) -> Response {
        match self {
            FloodgateError::RateLimited {
                max_requests,
                window_secs,
                retry_after_secs,
            } => {
                let body = Json(json!({
                    "error": "Too Many Requests",
                    "message": format!(
                        "Rate limit exceeded. Maximum {} requests per {} seconds",
                        max_requests, window_secs
                    ),
                    "retryAfterSeconds": retry_after_secs,
                    "timestamp": Utc::now().to_rfc3339(),
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                attach_limit_headers(response.headers_mut(), max_requests, window_secs);
                response
            }
            other => {
                let body = Json(json!({
                    "error": "Internal Server Error",
                    "message": other.to_string(),
                    "timestamp": Utc::now().to_rfc3339(),
                }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::RateLimiter;
    use axum::{body::Body, middleware as axum_middleware, routing::get, Router};
    use tower::ServiceExt;

    fn peer() -> SocketAddr {
        "192.0.2.10:54321".parse().unwrap()
    }

    fn governance(per_ip: bool, max_requests: u32) -> Governance {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(max_requests, 60, clock));
        let settings = RateLimitSettings {
            per_ip,
            max_requests,
            ..Default::default()
        };
        Governance::new(settings, limiter)
    }

    fn governed_app(settings: RateLimitSettings) -> Router {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(
            settings.max_requests,
            settings.window_size_secs,
            clock,
        ));
        let governance = Arc::new(Governance::new(settings, limiter));

        async fn hello() -> &'static str {
            "hello"
        }

        Router::new()
            .route("/v1/hello", get(hello))
            .layer(axum_middleware::from_fn_with_state(governance, govern))
    }

    fn get_request(path: &str) -> Request {
        let mut request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .unwrap();
        // What into_make_service_with_connect_info provides at serve time
        request.extensions_mut().insert(ConnectInfo(peer()));
        request
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());

        assert_eq!(client_ip(&headers, peer()), "203.0.113.5");
    }

    #[test]
    fn test_client_ip_skips_unknown_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "Unknown".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());

        assert_eq!(client_ip(&headers, peer()), "198.51.100.7");
    }

    #[test]
    fn test_client_ip_skips_empty_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "".parse().unwrap());
        headers.insert("x-real-ip", "  ".parse().unwrap());

        assert_eq!(client_ip(&headers, peer()), "192.0.2.10");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer()), "192.0.2.10");
    }

    #[test]
    fn test_rate_limit_key_global_mode() {
        let governance = governance(false, 10);
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.5".parse().unwrap());

        assert_eq!(governance.rate_limit_key(&headers, peer()), "global");
    }

    #[test]
    fn test_global_mode_shares_one_bucket() {
        let governance = governance(false, 2);
        let headers_a = HeaderMap::new();
        let mut headers_b = HeaderMap::new();
        headers_b.insert("x-forwarded-for", "203.0.113.5".parse().unwrap());

        assert!(governance.check(&headers_a, peer()).allowed);
        assert!(governance.check(&headers_b, peer()).allowed);
        // Caller A exhausted the shared allowance, so B is denied too
        assert!(!governance.check(&headers_b, peer()).allowed);
    }

    #[test]
    fn test_per_ip_mode_isolates_callers() {
        let governance = governance(true, 1);
        let mut headers_a = HeaderMap::new();
        headers_a.insert("x-forwarded-for", "203.0.113.5".parse().unwrap());
        let mut headers_b = HeaderMap::new();
        headers_b.insert("x-forwarded-for", "198.51.100.7".parse().unwrap());

        assert!(governance.check(&headers_a, peer()).allowed);
        assert!(!governance.check(&headers_a, peer()).allowed);
        assert!(governance.check(&headers_b, peer()).allowed);
    }

    #[tokio::test]
    async fn test_allowed_response_carries_limit_headers() {
        let app = governed_app(RateLimitSettings {
            max_requests: 2,
            ..Default::default()
        });

        let response = app.oneshot(get_request("/v1/hello")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "2");
        assert_eq!(response.headers().get("x-ratelimit-window").unwrap(), "60");
    }

    #[tokio::test]
    async fn test_exhausted_allowance_short_circuits_with_429() {
        let app = governed_app(RateLimitSettings {
            max_requests: 1,
            ..Default::default()
        });

        let response = app.clone().oneshot(get_request("/v1/hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/v1/hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "60");
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "1");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Too Many Requests");
        assert_eq!(body["retryAfterSeconds"], 60);
    }

    #[tokio::test]
    async fn test_disabled_limiter_passes_through_untouched() {
        let app = governed_app(RateLimitSettings {
            enabled: false,
            max_requests: 0,
            ..Default::default()
        });

        for _ in 0..3 {
            let response = app.clone().oneshot(get_request("/v1/hello")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
            assert!(response.headers().get("x-ratelimit-window").is_none());
        }
    }

    #[tokio::test]
    async fn test_excluded_path_passes_through_untouched() {
        let app = governed_app(RateLimitSettings {
            max_requests: 0,
            exclude_patterns: vec!["/v1/hello".to_string()],
            ..Default::default()
        });

        // A zero allowance would deny everything if the path were governed
        let response = app.oneshot(get_request("/v1/hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_non_included_path_passes_through_untouched() {
        let app = governed_app(RateLimitSettings {
            max_requests: 0,
            include_patterns: vec!["/api/**".to_string()],
            ..Default::default()
        });

        let response = app.oneshot(get_request("/v1/hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_error_renders_429() {
        let error = FloodgateError::RateLimited {
            max_requests: 3,
            window_secs: 60,
            retry_after_secs: 7,
        };
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "7");
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "3");
        assert_eq!(response.headers().get("x-ratelimit-window").unwrap(), "60");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Too Many Requests");
        assert_eq!(body["retryAfterSeconds"], 7);
        assert!(body["message"].as_str().unwrap().contains("3 requests per 60 seconds"));
        assert!(body["timestamp"].is_string());
    }
}
