//! Query Cache Server
//!
//! Serves the live query cache over HTTP, restoring it from the durable
//! snapshot at start-up and flushing it back on change and at shutdown.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::api::create_router;
use query_cache::{flush_snapshot, spawn_gc_task, spawn_persist_task, AppState, Config};

/// Main entry point for the query cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Restore the cache from its durable snapshot
/// 4. Start background garbage collection and persistence tasks
/// 5. Serve HTTP until SIGINT/SIGTERM
/// 6. Flush a final snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Query Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, stale_time={}ms, gc_time={}ms, port={}, snapshot={}/{} ({})",
        config.max_entries,
        config.default_stale_time_ms,
        config.default_gc_time_ms,
        config.server_port,
        config.snapshot_dir.display(),
        config.snapshot_key,
        config.snapshot_encoding
    );

    let state = AppState::from_config(&config);
    info!(
        "Cache initialized with {} restored entries",
        state.cache.read().await.len()
    );

    let gc_handle = spawn_gc_task(state.cache.clone(), config.gc_interval);
    let persist_handle = spawn_persist_task(
        state.cache.clone(),
        state.persister.clone(),
        config.persist_interval,
    );

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(vec![gc_handle, persist_handle]))
        .await
        .context("server error")?;

    match flush_snapshot(&state.cache, &state.persister).await {
        Ok((entries, bytes)) => info!("Final snapshot: {} entries, {} bytes", entries, bytes),
        Err(err) => warn!("Final snapshot failed: {}", err),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts background tasks.
async fn shutdown_signal(task_handles: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in task_handles {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
