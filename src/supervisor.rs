//! Reconciles the configured root set with running engines.
//!
//! The supervisor never terminates engines directly; the state column is
//! the single source of truth for lifecycle transitions. It only spawns
//! engines, reaps finished ones, and demotes vanished roots to `wiping`.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;

use crate::catalog::{FilesTable, RootState, WatchedDirs};
use crate::engine::{DirectoryEngine, WriteToken};
use crate::shutdown::ShutdownSignal;

const TICK: Duration = Duration::from_secs(1);

pub struct Supervisor {
    watched: WatchedDirs,
    files: FilesTable,
    /// Root ids that currently have a running engine.
    live: HashSet<i64>,
    done_tx: Sender<i64>,
    done_rx: Receiver<i64>,
}

impl Supervisor {
    pub fn new(watched: WatchedDirs, files: FilesTable) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            watched,
            files,
            live: HashSet::new(),
            done_tx,
            done_rx,
        }
    }

    /// Run until shutdown, one reconciliation pass per second.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<()> {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    tracing::debug!("supervisor exiting");
                    return Ok(());
                }
                _ = ticker.tick() => self.reconcile()?,
            }
        }
    }

    fn reconcile(&mut self) -> Result<()> {
        // Reap engines that finished wiping.
        while let Ok(dir_id) = self.done_rx.try_recv() {
            self.live.remove(&dir_id);
            tracing::debug!(dir_id, "engine reaped");
        }

        for root in self.watched.list()? {
            if !is_valid_dir(&root.path) && root.state != RootState::Wiping {
                tracing::warn!(
                    dir_id = root.id,
                    path = %root.path,
                    "watched directory disappeared, removing it from the catalog"
                );
                self.watched.mark_wiping(root.id)?;
            }
            // Spawn regardless of state: an engine for an already-wiping
            // root goes straight through the Wiping branch and cleans up.
            if !self.live.contains(&root.id) {
                self.spawn_engine(root.id)?;
            }
        }
        Ok(())
    }

    fn spawn_engine(&mut self, dir_id: i64) -> Result<()> {
        let inserted = self.live.insert(dir_id);
        debug_assert!(inserted, "duplicate engine for dir_id {dir_id}");

        let engine = DirectoryEngine::new(
            WriteToken::issue(dir_id),
            self.watched.clone(),
            self.files.clone(),
            self.done_tx.clone(),
        );
        engine
            .spawn()
            .with_context(|| format!("spawning engine for dir_id {dir_id}"))?;
        tracing::debug!(dir_id, "engine spawned");
        Ok(())
    }
}

fn is_valid_dir(path: &str) -> bool {
    std::fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false)
}
