// filedex - background filesystem indexing daemon
//
// Maintains a searchable catalog of files and directories under a set of
// watched roots: an initial recursive crawl per root, then live updates
// from filesystem change events.
//
// Architecture:
// - Catalog store (rusqlite): files.db behind a batched writer thread,
//   watched_dirs.db written instantly
// - Directory engines: one OS thread per watched root driving the
//   Indexing -> Updating -> Wiping state machine
// - Supervisor: reconciles the configured root set with running engines
//   once a second
// - RPC server (axum): search/add/remove/watched-dirs/stop plus a
//   liveness probe
// - Shutdown broadcaster: watch channel observed by every long-running
//   task; Ctrl-C and the RPC stop operation both trigger it

mod catalog;
mod cli;
mod collector;
mod config;
mod engine;
mod fatal;
mod logging;
mod rpc;
mod shutdown;
mod startup;
mod supervisor;
mod util;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use catalog::{CatalogStore, FilesTable, WatchedDirs, CADENCE_INSTANT};
use shutdown::ShutdownController;

/// Commit cadence of the files catalog writer.
const COMMIT_CADENCE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    if cli::handle_subcommand(&cli) {
        return Ok(());
    }

    let config = config::Config::from_cli(&cli)?;
    startup::print_banner(&config);
    let _log_guard = logging::init(&config)?;

    let shutdown = Arc::new(ShutdownController::new());

    let watched_store = CatalogStore::open(
        &config.watched_db(),
        CADENCE_INSTANT,
        shutdown.subscribe(),
        catalog::init_watched_schema,
    )?;
    let files_store = CatalogStore::open(
        &config.files_db(),
        COMMIT_CADENCE,
        shutdown.subscribe(),
        catalog::init_files_schema,
    )?;
    let watched = WatchedDirs::new(watched_store.clone());
    let files = FilesTable::new(files_store.clone());

    // Restart idempotence: every root goes through a full crawl again, so
    // an unclean exit converges back to the on-disk truth.
    watched.force_all_indexing()?;

    // Bind before spawning anything so a taken port fails fast.
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding RPC listener on {addr}"))?;
    tracing::info!("RPC server listening on {addr}");

    // Ctrl-C behaves like an RPC stop call.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                shutdown.terminate();
            }
        });
    }

    let rpc_state = rpc::RpcState {
        watched: watched.clone(),
        files: files.clone(),
        shutdown: shutdown.clone(),
    };
    let server = tokio::spawn(rpc::serve(listener, rpc_state, shutdown.subscribe()));

    let supervisor = supervisor::Supervisor::new(watched, files);
    match tokio::spawn(supervisor.run(shutdown.subscribe())).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => fatal::unrecoverable("supervisor", err),
        Err(err) => fatal::unrecoverable("supervisor", err.into()),
    }

    // Flush the batched writer. Engines are deliberately not joined: the
    // forced re-index on the next start makes abandoning them safe.
    files_store.shutdown();
    watched_store.shutdown();

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!("RPC server error: {err:#}"),
        Err(err) => tracing::error!("RPC server task failed: {err:#}"),
    }

    tracing::info!("daemon exiting, bye!");
    Ok(())
}
