//! The HTTP JSON-RPC surface.
//!
//! One axum router: the control/query operations under `/rpc/*` and a
//! fixed liveness string at `/`. The server shuts down gracefully when the
//! shutdown broadcast fires.

mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::catalog::{FilesTable, WatchedDirs};
use crate::shutdown::{ShutdownController, ShutdownSignal};

/// Shared state for the RPC handlers.
#[derive(Clone)]
pub struct RpcState {
    pub watched: WatchedDirs,
    pub files: FilesTable,
    pub shutdown: Arc<ShutdownController>,
}

/// Serve the RPC surface on a pre-bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    state: RpcState,
    mut shutdown: ShutdownSignal,
) -> Result<()> {
    let app = Router::new()
        .route("/", get(handlers::health))
        .route("/rpc/search", post(handlers::search))
        .route("/rpc/add", post(handlers::add))
        .route("/rpc/remove", post(handlers::remove))
        .route("/rpc/watched-dirs", get(handlers::watched_dirs))
        .route("/rpc/stop", post(handlers::stop))
        .with_state(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.wait().await;
        })
        .await
        .context("RPC server error")?;

    tracing::info!("RPC server shut down");
    Ok(())
}
