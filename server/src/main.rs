//! QuoteSync Server - keeps a local quote collection reconciled with a remote.
//!
//! The server owns the quote collection, runs sync rounds against the remote
//! on demand and on a timer, and exposes the collection over HTTP and
//! WebSocket to whatever presentation layer sits on top.

mod clock;
mod config;
mod engine;
mod error;
mod remote;
mod routes;
mod scheduler;
mod storage;
#[cfg(test)]
mod testing;
mod websocket;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::engine::Engine;
use crate::remote::HttpRemote;
use crate::scheduler::SyncScheduler;
use crate::storage::JsonFileStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub scheduler: Arc<SyncScheduler>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quotesync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting QuoteSync Server on {}:{}", config.host, config.port);
    tracing::info!(
        data_dir = %config.data_dir.display(),
        remote = %config.remote_url,
        "Using local store and remote"
    );

    let store = Arc::new(JsonFileStore::new(&config.data_dir));
    let engine = Arc::new(Engine::open(store, Arc::new(SystemClock)).await);

    let remote = Arc::new(HttpRemote::new(&config.remote_url, config.request_timeout)?);
    let scheduler = SyncScheduler::new(
        engine.clone(),
        remote,
        config.fetch_limit,
        config.sync_interval,
    );
    if config.auto_sync {
        scheduler.set_auto_sync(true, None);
    }

    let app = routes::app(AppState {
        engine,
        scheduler: scheduler.clone(),
    });

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
