//! The per-root lifecycle engine: Indexing → Updating → Wiping.
//!
//! State lives in the watched-roots store and is externally mutable (the
//! RPC Remove operation and the supervisor both write it), so the engine
//! re-reads it at every natural checkpoint: between swept rows, between
//! walked entries, and between drained events.

use std::path::Path;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use walkdir::WalkDir;

use crate::catalog::{FileRecord, FilesTable, RootState, WatchedDirs};
use crate::collector::{EventCollector, FsEvent, FsEventKind};
use crate::util::{mtime_ns, split_path};

/// Idle sleep between event-buffer polls. Bounds the latency of noticing a
/// `wiping` transition while the buffer is empty.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Exclusive right to mutate file records for one `dir_id`.
///
/// Issued by the supervisor, at most one live token per root; an engine
/// cannot be constructed without one. This makes the single-writer-per-
/// root invariant a constructible fact instead of a convention.
#[derive(Debug)]
pub struct WriteToken {
    dir_id: i64,
}

impl WriteToken {
    pub(crate) fn issue(dir_id: i64) -> Self {
        Self { dir_id }
    }

    pub fn dir_id(&self) -> i64 {
        self.dir_id
    }
}

/// Outcome of a crawl or sweep pass that polls for state transitions.
enum Pass {
    Finished,
    Aborted,
}

/// The state machine driving one watched root.
pub struct DirectoryEngine {
    token: WriteToken,
    watched: WatchedDirs,
    files: FilesTable,
    done: Sender<i64>,
}

impl DirectoryEngine {
    pub fn new(
        token: WriteToken,
        watched: WatchedDirs,
        files: FilesTable,
        done: Sender<i64>,
    ) -> Self {
        Self {
            token,
            watched,
            files,
            done,
        }
    }

    fn dir_id(&self) -> i64 {
        self.token.dir_id()
    }

    /// Run the engine on its own named OS thread. Errors escaping the
    /// state machine are unrecoverable.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let name = format!("engine-{}", self.dir_id());
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            if let Err(err) = self.run() {
                crate::fatal::unrecoverable(&name, err);
            }
        })?;
        Ok(handle)
    }

    fn run(self) -> Result<()> {
        let dir_id = self.dir_id();
        tracing::debug!(dir_id, "engine started");

        let Some(root) = self.watched.path_of(dir_id)? else {
            // The row is the lifecycle's source of truth; without it the
            // lifecycle is already over.
            let _ = self.done.send(dir_id);
            return Ok(());
        };
        let collector = EventCollector::subscribe(Path::new(&root));
        tracing::debug!(dir_id, live = collector.is_live(), "event subscription ready");

        loop {
            match self.watched.state_of(dir_id)? {
                None => {
                    let _ = self.done.send(dir_id);
                    return Ok(());
                }
                Some(RootState::Indexing) => self.index(&root)?,
                Some(RootState::Updating) => self.update(&collector)?,
                Some(RootState::Wiping) => {
                    // Unsubscribe first; pending events are discarded.
                    drop(collector);
                    self.wipe()?;
                    tracing::debug!(dir_id, "engine finished");
                    return Ok(());
                }
            }
        }
    }

    /// True when the root has left `indexing` and the current pass must
    /// stop immediately.
    fn interrupted(&self) -> Result<bool> {
        Ok(!matches!(
            self.watched.state_of(self.dir_id())?,
            Some(RootState::Indexing)
        ))
    }

    /// Indexing phase: stale-row sweep, recursive crawl, promotion.
    fn index(&self, root: &str) -> Result<()> {
        let dir_id = self.dir_id();
        tracing::debug!(dir_id, root, "indexing started");

        if matches!(self.sweep_stale_rows()?, Pass::Aborted) {
            return Ok(());
        }
        if matches!(self.crawl(root)?, Pass::Aborted) {
            return Ok(());
        }

        // Promote only while still `indexing`; the statement's guard lets
        // any concurrent transition win.
        self.watched.promote_to_updating(dir_id)?;
        tracing::debug!(dir_id, "indexing done");
        Ok(())
    }

    /// Delete records whose file no longer exists on disk.
    fn sweep_stale_rows(&self) -> Result<Pass> {
        let dir_id = self.dir_id();
        for (path_to_file, fname) in self.files.keys_for_dir(dir_id)? {
            if self.interrupted()? {
                return Ok(Pass::Aborted);
            }
            let full = Path::new(&path_to_file).join(&fname);
            if !full.exists() {
                tracing::debug!(dir_id, path = %full.display(), "removing record for vanished file");
                self.files.delete(&path_to_file, &fname)?;
            }
        }
        Ok(Pass::Finished)
    }

    /// Depth-first walk upserting every reachable entry. Per-entry errors
    /// are logged and skipped.
    fn crawl(&self, root: &str) -> Result<Pass> {
        let dir_id = self.dir_id();
        for entry in WalkDir::new(root) {
            if self.interrupted()? {
                return Ok(Pass::Aborted);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(dir_id, "skipping unreadable entry: {err}");
                    continue;
                }
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::warn!(dir_id, path = %entry.path().display(), "skipping entry: {err}");
                    continue;
                }
            };
            self.record(entry.path(), &meta)?;
        }
        Ok(Pass::Finished)
    }

    /// Updating phase: drain one event, or sleep briefly when idle so the
    /// next state check is never far away.
    fn update(&self, collector: &EventCollector) -> Result<()> {
        match collector.pop() {
            Some(event) => self.apply_event(event),
            None => {
                thread::sleep(IDLE_POLL);
                Ok(())
            }
        }
    }

    fn apply_event(&self, event: FsEvent) -> Result<()> {
        tracing::trace!(dir_id = self.dir_id(), path = %event.path.display(), "handling event");
        let (path_to_file, fname) = split_path(&event.path);
        match event.kind {
            FsEventKind::Remove => self.files.delete(&path_to_file, &fname),
            FsEventKind::Touch => match std::fs::metadata(&event.path) {
                // Gone or unreadable since the event was recorded.
                Err(_) => self.files.delete(&path_to_file, &fname),
                Ok(meta) => self.record(&event.path, &meta),
            },
        }
    }

    fn record(&self, path: &Path, meta: &std::fs::Metadata) -> Result<()> {
        let (path_to_file, fname) = split_path(path);
        self.files.upsert(&FileRecord {
            dir_id: self.dir_id(),
            path_to_file,
            fname,
            size: meta.len() as i64,
            mtime_ns: meta.modified().map(mtime_ns).unwrap_or(0),
            is_dir: meta.is_dir(),
        })
    }

    /// Wiping phase: bulk-delete owned records, report done, drop the
    /// root's row, exit.
    fn wipe(&self) -> Result<()> {
        let dir_id = self.dir_id();
        tracing::debug!(dir_id, "wipe started");
        self.files.delete_dir(dir_id)?;
        let _ = self.done.send(dir_id);
        self.watched.delete(dir_id)?;
        tracing::debug!(dir_id, "wipe done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        init_files_schema, init_watched_schema, CatalogStore, CADENCE_INSTANT,
    };
    use crate::shutdown::ShutdownController;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Instant;

    struct Fixture {
        _workdir: tempfile::TempDir,
        root: tempfile::TempDir,
        watched: WatchedDirs,
        files: FilesTable,
        done_rx: Receiver<i64>,
        engine: DirectoryEngine,
        dir_id: i64,
    }

    fn fixture() -> Fixture {
        let workdir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let signal = ShutdownController::new().subscribe();
        let watched_store = CatalogStore::open(
            &workdir.path().join("watched_dirs.db"),
            CADENCE_INSTANT,
            signal.clone(),
            init_watched_schema,
        )
        .unwrap();
        let files_store = CatalogStore::open(
            &workdir.path().join("files.db"),
            CADENCE_INSTANT,
            signal,
            init_files_schema,
        )
        .unwrap();
        let watched = WatchedDirs::new(watched_store);
        let files = FilesTable::new(files_store);

        watched.insert(&root.path().to_string_lossy()).unwrap();
        let dir_id = watched.list().unwrap()[0].id;

        let (done_tx, done_rx) = mpsc::channel();
        let engine = DirectoryEngine::new(
            WriteToken::issue(dir_id),
            watched.clone(),
            files.clone(),
            done_tx,
        );
        Fixture {
            _workdir: workdir,
            root,
            watched,
            files,
            done_rx,
            engine,
            dir_id,
        }
    }

    #[test]
    fn index_crawls_tree_and_promotes() {
        let fx = fixture();
        std::fs::write(fx.root.path().join("x.txt"), b"0123456789").unwrap();
        std::fs::create_dir(fx.root.path().join("sub")).unwrap();
        std::fs::write(fx.root.path().join("sub/y.bin"), vec![0u8; 20]).unwrap();

        let root = fx.root.path().to_string_lossy().into_owned();
        fx.engine.index(&root).unwrap();

        assert_eq!(
            fx.watched.state_of(fx.dir_id).unwrap(),
            Some(RootState::Updating)
        );

        let hits = fx.files.search("x.txt").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].size, 10);
        assert!(!hits[0].is_dir);
        let (expected_dir, _) = split_path(&fx.root.path().join("x.txt"));
        assert_eq!(hits[0].path_to_file, expected_dir);

        let subdir = fx.files.search("sub").unwrap();
        assert!(subdir.iter().any(|r| r.is_dir));
        assert_eq!(fx.files.search("y.bin").unwrap().len(), 1);
    }

    #[test]
    fn index_sweeps_stale_rows() {
        let fx = fixture();
        std::fs::write(fx.root.path().join("keep.txt"), b"k").unwrap();
        // A record for a file that no longer exists on disk.
        let (dir, _) = split_path(&fx.root.path().join("gone.txt"));
        fx.files
            .upsert(&FileRecord {
                dir_id: fx.dir_id,
                path_to_file: dir,
                fname: "gone.txt".to_string(),
                size: 1,
                mtime_ns: 1,
                is_dir: false,
            })
            .unwrap();

        let root = fx.root.path().to_string_lossy().into_owned();
        fx.engine.index(&root).unwrap();

        assert!(fx.files.search("gone.txt").unwrap().is_empty());
        assert_eq!(fx.files.search("keep.txt").unwrap().len(), 1);
    }

    #[test]
    fn index_aborted_by_wiping_never_promotes() {
        let fx = fixture();
        std::fs::write(fx.root.path().join("x.txt"), b"x").unwrap();
        fx.watched.mark_wiping(fx.dir_id).unwrap();

        let root = fx.root.path().to_string_lossy().into_owned();
        fx.engine.index(&root).unwrap();

        assert_eq!(
            fx.watched.state_of(fx.dir_id).unwrap(),
            Some(RootState::Wiping)
        );
        assert_eq!(fx.files.count_for_dir(fx.dir_id).unwrap(), 0);
    }

    #[test]
    fn apply_event_upserts_and_removes() {
        let fx = fixture();
        let file = fx.root.path().join("z.md");
        std::fs::write(&file, b"01234").unwrap();

        fx.engine
            .apply_event(FsEvent {
                path: file.clone(),
                kind: FsEventKind::Touch,
            })
            .unwrap();
        let hits = fx.files.search("z.md").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].size, 5);

        fx.engine
            .apply_event(FsEvent {
                path: file.clone(),
                kind: FsEventKind::Remove,
            })
            .unwrap();
        assert!(fx.files.search("z.md").unwrap().is_empty());
    }

    #[test]
    fn touch_event_for_vanished_path_deletes_record() {
        let fx = fixture();
        let file = fx.root.path().join("w.txt");
        std::fs::write(&file, b"w").unwrap();
        fx.engine
            .apply_event(FsEvent {
                path: file.clone(),
                kind: FsEventKind::Touch,
            })
            .unwrap();
        std::fs::remove_file(&file).unwrap();

        // Stat fails now, so even a non-remove event deletes the record.
        fx.engine
            .apply_event(FsEvent {
                path: file,
                kind: FsEventKind::Touch,
            })
            .unwrap();
        assert!(fx.files.search("w.txt").unwrap().is_empty());
    }

    #[test]
    fn run_wipes_marked_root_and_exits() {
        let fx = fixture();
        fx.files
            .upsert(&FileRecord {
                dir_id: fx.dir_id,
                path_to_file: "/somewhere/".to_string(),
                fname: "old".to_string(),
                size: 1,
                mtime_ns: 1,
                is_dir: false,
            })
            .unwrap();
        fx.watched.mark_wiping(fx.dir_id).unwrap();

        let handle = fx.engine.spawn().unwrap();
        let done = fx
            .done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("engine reported done");
        assert_eq!(done, fx.dir_id);
        handle.join().unwrap();

        assert_eq!(fx.files.count_for_dir(fx.dir_id).unwrap(), 0);
        assert_eq!(fx.watched.state_of(fx.dir_id).unwrap(), None);
    }

    #[test]
    fn run_exits_when_root_row_vanished() {
        let fx = fixture();
        fx.watched.delete(fx.dir_id).unwrap();

        let handle = fx.engine.spawn().unwrap();
        let done = fx
            .done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("engine reported done");
        assert_eq!(done, fx.dir_id);
        handle.join().unwrap();
    }

    #[test]
    fn live_update_reflects_created_and_removed_files() {
        let fx = fixture();
        if !EventCollector::subscribe(fx.root.path()).is_live() {
            // No watcher backend on this platform.
            return;
        }

        let dir_id = fx.dir_id;
        let watched = fx.watched.clone();
        let files = fx.files.clone();
        let _handle = fx.engine.spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while watched.state_of(dir_id).unwrap() != Some(RootState::Updating) {
            assert!(Instant::now() < deadline, "root never promoted");
            thread::sleep(Duration::from_millis(20));
        }

        let file = fx.root.path().join("z.md");
        std::fs::write(&file, b"01234").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let hits = files.search("z.md").unwrap();
            if hits.len() == 1 && hits[0].size == 5 {
                break;
            }
            assert!(Instant::now() < deadline, "created file never indexed");
            thread::sleep(Duration::from_millis(20));
        }

        std::fs::remove_file(&file).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !files.search("z.md").unwrap().is_empty() {
            assert!(Instant::now() < deadline, "removed file never dropped");
            thread::sleep(Duration::from_millis(20));
        }

        watched.mark_wiping(dir_id).unwrap();
        fx.done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("engine reported done");
    }

    #[test]
    fn full_lifecycle_reaches_updating_then_wipes() {
        let fx = fixture();
        std::fs::write(fx.root.path().join("x.txt"), b"x").unwrap();
        let dir_id = fx.dir_id;
        let watched = fx.watched.clone();
        let files = fx.files.clone();

        let handle = fx.engine.spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while watched.state_of(dir_id).unwrap() != Some(RootState::Updating) {
            assert!(Instant::now() < deadline, "root never promoted");
            thread::sleep(Duration::from_millis(20));
        }

        watched.mark_wiping(dir_id).unwrap();
        let done = fx
            .done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("engine reported done");
        assert_eq!(done, dir_id);
        handle.join().unwrap();

        assert_eq!(files.count_for_dir(dir_id).unwrap(), 0);
        assert!(watched.list().unwrap().is_empty());
    }
}
