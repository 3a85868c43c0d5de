//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener
//! - Initialize subsystems in dependency order (metrics, fetcher, server)
//! - Serve until shutdown, then release the fetcher's resources
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds before the fetcher exists, so a taken port fails
//!   without launching anything
//! - The fetcher is shut down after the server drains, never before

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use super::{signals, Shutdown};
use crate::config::ProxyConfig;
use crate::fetch::build_fetcher;
use crate::http::HttpServer;
use crate::observability::metrics;

/// Errors that abort startup or serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Bind the configured listener address.
pub async fn bind(config: &ProxyConfig) -> Result<TcpListener, StartupError> {
    let address = config.listener.bind_address();
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}

/// Serve on `listener` until `shutdown` fires.
pub async fn serve(
    config: ProxyConfig,
    listener: TcpListener,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    let shutdown_rx = shutdown.subscribe();

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let fetcher = build_fetcher(&config)?;
    let server = HttpServer::new(&config, Arc::clone(&fetcher));
    let result = server.run(listener, shutdown_rx).await;

    fetcher.shutdown().await;
    result.map_err(StartupError::from)
}

/// Bind, install signal handling, and serve until signalled.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let listener = bind(&config).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        strategy = %config.fetch.strategy,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());
    serve(config, listener, shutdown).await
}
