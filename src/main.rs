//! cronwatch server entry point.
//!
//! Starts the Axum HTTP server with REST, ping and WebSocket endpoints and
//! the background liveness sweeper.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use cronwatch::alert::AlertDispatcher;
use cronwatch::api;
use cronwatch::app_state::AppState;
use cronwatch::config::{LogFormat, ServiceConfig};
use cronwatch::persistence::MonitorStore;
use cronwatch::persistence::memory::MemoryStore;
use cronwatch::persistence::postgres::PostgresStore;
use cronwatch::persistence::rate_limit::{MemoryRateLimiter, PostgresRateLimiter, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServiceConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting cronwatch");

    // Build persistence layer
    let policy = config.ping_rate_policy();
    let (store, limiter): (Arc<dyn MonitorStore>, Arc<dyn RateLimiter>) =
        if config.persistence_enabled {
            let pg = PostgresStore::connect(&config).await?;
            let limiter = PostgresRateLimiter::new(pg.pool().clone(), policy);
            (Arc::new(pg), Arc::new(limiter))
        } else {
            tracing::warn!("persistence disabled, monitors live in memory only");
            (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryRateLimiter::new(policy)),
            )
        };

    // Build service layer
    let alerts = AlertDispatcher::from_config(&config)?;
    let sweep_interval = config.sweep_interval_secs;
    let listen_addr = config.listen_addr;
    let state = AppState::new(config, store, limiter, alerts);

    if sweep_interval > 0 {
        let sweeper = (*state.sweeper).clone();
        tokio::spawn(sweeper.run(Duration::from_secs(sweep_interval)));
    } else {
        tracing::info!("background sweeper disabled, use POST /internal/sweep");
    }

    // Build router
    let app = api::build_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
