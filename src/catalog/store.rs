//! The low-level catalog store: one SQLite database file per store, with
//! instant or batched mutation dispatch.
//!
//! # Architecture
//!
//! ```text
//! readers / instant exec ──→ Mutex<Connection> (shared)
//!
//! batched exec ──→ std::sync::mpsc (unbounded)
//!                      │
//!                      └──→ Dedicated Writer Thread (own connection)
//!                              │
//!                              ├──→ BEGIN ... statements ... COMMIT
//!                              │    (commit on cadence tick, mutex held)
//!                              └──→ shutdown command: final COMMIT, exit
//! ```
//!
//! Readers observe only committed state; statements enqueued before a tick
//! are all visible no later than the commit at that tick.

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

use crate::shutdown::ShutdownSignal;

/// Commit cadence that selects instant mode: mutations execute directly
/// under the store mutex, with no writer thread.
pub const CADENCE_INSTANT: Duration = Duration::ZERO;

/// How long `shutdown()` waits for the writer's final commit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Build an owned parameter list for [`CatalogStore`] operations.
///
/// Parameters are owned `rusqlite::types::Value`s so batched statements can
/// cross the writer-queue thread boundary.
#[macro_export]
macro_rules! sql_params {
    ($($value:expr),* $(,)?) => {
        vec![$(rusqlite::types::Value::from($value)),*]
    };
}

/// One enqueued mutation.
struct Statement {
    sql: &'static str,
    params: Vec<Value>,
}

enum WriterCommand {
    Exec(Statement),
    Shutdown,
}

/// Lets a shutting-down caller wait until the writer thread has committed
/// its final transaction.
struct CompletionSignal {
    done: Mutex<bool>,
    cv: Condvar,
}

impl CompletionSignal {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn complete(&self) {
        *lock(&self.done) = true;
        self.cv.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.done);
        let (guard, result) = self
            .cv
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(guard);
        !result.timed_out()
    }
}

struct WriterHandle {
    tx: Sender<WriterCommand>,
    completion: Arc<CompletionSignal>,
}

/// Transactional persistence for one catalog database.
///
/// `query`/`query_row` are synchronous reads under the store mutex. `exec`
/// dispatches by the commit cadence chosen at open: instant stores execute
/// directly, batched stores enqueue for the writer thread.
pub struct CatalogStore {
    conn: Arc<Mutex<Connection>>,
    writer: Option<WriterHandle>,
    shutdown: ShutdownSignal,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("opening catalog database {}", path.display()))?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA busy_timeout=5000;
        "#,
    )
    .context("applying connection pragmas")?;
    Ok(conn)
}

impl CatalogStore {
    /// Open the database, initialize its schema, and start the batched
    /// writer when `cadence` is non-zero.
    pub fn open(
        path: &Path,
        cadence: Duration,
        shutdown: ShutdownSignal,
        init_schema: fn(&Connection) -> Result<()>,
    ) -> Result<Arc<Self>> {
        let conn = open_connection(path)?;
        init_schema(&conn).with_context(|| format!("initializing schema for {}", path.display()))?;
        let conn = Arc::new(Mutex::new(conn));

        let writer = if cadence == CADENCE_INSTANT {
            None
        } else {
            Some(Self::start_writer(path, cadence, conn.clone(), &shutdown)?)
        };

        Ok(Arc::new(Self {
            conn,
            writer,
            shutdown,
        }))
    }

    fn start_writer(
        path: &Path,
        cadence: Duration,
        gate: Arc<Mutex<Connection>>,
        shutdown: &ShutdownSignal,
    ) -> Result<WriterHandle> {
        // The writer owns its own connection so readers never observe the
        // open transaction; the shared mutex is taken only around commits.
        let writer_conn = open_connection(path)?;
        let (tx, rx) = mpsc::channel();
        let completion = Arc::new(CompletionSignal::new());

        let thread_completion = completion.clone();
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalog".into());
        thread::Builder::new()
            .name(format!("writer-{name}"))
            .spawn(move || {
                if let Err(err) = writer_thread(writer_conn, gate, rx, cadence) {
                    crate::fatal::unrecoverable("catalog writer", err);
                }
                thread_completion.complete();
            })
            .context("spawning catalog writer thread")?;

        // Forward the process-wide shutdown broadcast into the queue so the
        // writer commits and exits without anyone calling `shutdown()`.
        // Outside a runtime (tests), `shutdown()` is the only trigger.
        if tokio::runtime::Handle::try_current().is_ok() {
            let mut signal = shutdown.clone();
            let forward = tx.clone();
            tokio::spawn(async move {
                signal.wait().await;
                let _ = forward.send(WriterCommand::Shutdown);
            });
        }

        Ok(WriterHandle { tx, completion })
    }

    /// Read-only query returning one decoded value per row.
    pub fn query<T>(
        &self,
        sql: &str,
        params: Vec<Value>,
        mut decode: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = lock(&self.conn);
        let mut stmt = conn
            .prepare(sql)
            .with_context(|| format!("preparing query: {sql}"))?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| decode(row))
            .with_context(|| format!("running query: {sql}"))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.with_context(|| format!("decoding row of: {sql}"))?);
        }
        Ok(out)
    }

    /// Read-only query expecting at most one row. More than one row is a
    /// programming error and surfaces as `Err` (fatal at the call site).
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: Vec<Value>,
        decode: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let mut rows = self.query(sql, params, decode)?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            n => bail!("query returned {n} rows, expected at most one: {sql}"),
        }
    }

    /// Execute a mutation according to the store's commit cadence.
    ///
    /// Instant stores run the statement immediately under the mutex.
    /// Batched stores enqueue it; the enqueue never blocks. Enqueueing
    /// after the writer exited is a no-op iff shutdown has been signalled.
    pub fn exec(&self, sql: &'static str, params: Vec<Value>) -> Result<()> {
        match &self.writer {
            None => {
                let conn = lock(&self.conn);
                conn.execute(sql, params_from_iter(params))
                    .with_context(|| format!("executing: {sql}"))?;
                Ok(())
            }
            Some(writer) => {
                if writer
                    .tx
                    .send(WriterCommand::Exec(Statement { sql, params }))
                    .is_err()
                {
                    if self.shutdown.is_signalled() {
                        tracing::debug!("statement dropped after writer exit: {sql}");
                        return Ok(());
                    }
                    bail!("catalog writer queue closed before shutdown: {sql}");
                }
                Ok(())
            }
        }
    }

    /// Flush and stop the batched writer; instant stores return
    /// immediately. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(writer) = &self.writer {
            let _ = writer.tx.send(WriterCommand::Shutdown);
            if !writer.completion.wait(SHUTDOWN_TIMEOUT) {
                tracing::warn!(
                    "catalog writer did not commit within {:?}",
                    SHUTDOWN_TIMEOUT
                );
            }
        }
    }
}

/// Writer loop: open a transaction, drain statements until the cadence
/// tick, commit with the store mutex held, repeat. A shutdown command
/// commits the open transaction and exits.
fn writer_thread(
    conn: Connection,
    gate: Arc<Mutex<Connection>>,
    rx: mpsc::Receiver<WriterCommand>,
    cadence: Duration,
) -> Result<()> {
    loop {
        conn.execute_batch("BEGIN").context("opening transaction")?;
        let deadline = Instant::now() + cadence;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(WriterCommand::Exec(stmt)) => {
                    conn.execute(stmt.sql, params_from_iter(stmt.params))
                        .with_context(|| format!("executing in transaction: {}", stmt.sql))?;
                }
                Ok(WriterCommand::Shutdown) => {
                    let _gate = lock(&gate);
                    conn.execute_batch("COMMIT").context("final commit")?;
                    tracing::debug!("catalog writer committed and exiting");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {
                    let _gate = lock(&gate);
                    conn.execute_batch("COMMIT").context("periodic commit")?;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Store dropped without an explicit shutdown.
                    let _gate = lock(&gate);
                    conn.execute_batch("COMMIT").context("final commit")?;
                    return Ok(());
                }
            }
        }
    }
}
