//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::Result;

use super::middleware::{govern, Governance};

/// HTTP server exposing the admission-check API behind the governance
/// middleware.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared middleware and handler state
    governance: Arc<Governance>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, governance: Arc<Governance>) -> Self {
        Self { addr, governance }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/v1/admit", post(admit))
            .layer(middleware::from_fn_with_state(
                self.governance.clone(),
                govern,
            ))
            .with_state(self.governance.clone())
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        Ok(())
    }
}

async fn health() -> &'static str {
    "OK"
}

/// Request body for the admission-check endpoint.
#[derive(Debug, Deserialize)]
struct AdmitRequest {
    /// The identity to check the allowance for
    key: String,
}

/// Verdict returned by the admission-check endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdmitResponse {
    allowed: bool,
    retry_after_seconds: u64,
    limit: u32,
    window_seconds: u64,
}

/// Remote admission check: callers submit a key and get the verdict back.
///
/// Denial is reported in the body, not via status code; this endpoint is a
/// query surface, not an enforcement point.
async fn admit(
    State(governance): State<Arc<Governance>>,
    Json(request): Json<AdmitRequest>,
) -> Response {
    if request.key.trim().is_empty() {
        warn!("Received admission check with empty key");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Bad Request",
                "message": "key is required",
            })),
        )
            .into_response();
    }

    let verdict = governance.limiter().admit(&request.key);
    info!(
        key = %request.key,
        allowed = verdict.allowed,
        "Admission decision made"
    );

    Json(AdmitResponse {
        allowed: verdict.allowed,
        retry_after_seconds: verdict.retry_after_secs,
        limit: governance.limiter().max_requests(),
        window_seconds: governance.limiter().window_secs(),
    })
    .into_response()
}
