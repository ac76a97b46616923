use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use floodgate::config::{FloodgateConfig, LimiterMode};
use floodgate::http::{Governance, HttpServer};
use floodgate::ratelimit::{
    spawn_eviction_sweep, RateLimiter, RateLimiterBackend, SlidingWindowLimiter,
};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "floodgate")]
#[command(about = "Per-key request rate limiting service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Floodgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => FloodgateConfig::from_file(path)?,
        None => FloodgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(
        listen_addr = %config.server.listen_addr,
        enabled = config.rate_limit.enabled,
        max_requests = config.rate_limit.max_requests,
        window_size_secs = config.rate_limit.window_size_secs,
        per_ip = config.rate_limit.per_ip,
        mode = ?config.rate_limit.mode,
        "Configuration loaded"
    );

    // Initialize the rate limiter
    let limiter: Arc<dyn RateLimiterBackend> = match config.rate_limit.mode {
        LimiterMode::FixedWindow => Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit.window_size_secs,
        )),
        LimiterMode::SlidingWindow => Arc::new(SlidingWindowLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit.window_size_secs,
        )),
    };
    info!("Rate limiter initialized");

    // Background sweep for buckets of keys no longer seen
    let sweep = spawn_eviction_sweep(
        limiter.clone(),
        Duration::from_secs(config.rate_limit.sweep_interval_secs),
        config.rate_limit.idle_ttl_millis(),
    );

    let governance = Arc::new(Governance::new(config.rate_limit.clone(), limiter));
    let server = HttpServer::new(config.server.listen_addr, governance);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweep.abort();
    info!("Floodgate Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
