//! Typed operations on the watched-roots database.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::store::CatalogStore;

/// Lifecycle state of a watched root. The numeric ids are persisted in the
/// `states` table and are part of the on-disk contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootState {
    Indexing,
    Wiping,
    Updating,
}

impl RootState {
    pub fn state_id(self) -> i64 {
        match self {
            RootState::Indexing => 1,
            RootState::Wiping => 2,
            RootState::Updating => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RootState::Indexing => "indexing",
            RootState::Wiping => "wiping",
            RootState::Updating => "updating",
        }
    }

    /// Decode the name column of the `watched_dirs_states` view. An
    /// unknown name means schema drift, which is fatal at the call site.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "indexing" => Ok(RootState::Indexing),
            "wiping" => Ok(RootState::Wiping),
            "updating" => Ok(RootState::Updating),
            other => bail!("unknown root state {other:?}"),
        }
    }
}

/// A root directory the daemon tracks.
#[derive(Debug, Clone)]
pub struct WatchedRoot {
    pub id: i64,
    pub path: String,
    pub state: RootState,
}

/// Handle to the watched-roots store.
#[derive(Clone)]
pub struct WatchedDirs {
    store: Arc<CatalogStore>,
}

impl WatchedDirs {
    pub fn new(store: Arc<CatalogStore>) -> Self {
        Self { store }
    }

    /// Every currently-known root, joined against the states view.
    pub fn list(&self) -> Result<Vec<WatchedRoot>> {
        let rows = self.store.query(
            "SELECT id, path_to_dir, state FROM watched_dirs_states",
            vec![],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;
        rows.into_iter()
            .map(|(id, path, state)| {
                Ok(WatchedRoot {
                    id,
                    path,
                    state: RootState::from_name(&state)?,
                })
            })
            .collect()
    }

    /// Current state of one root, or `None` when the row is gone.
    pub fn state_of(&self, id: i64) -> Result<Option<RootState>> {
        let name = self.store.query_row(
            "SELECT state FROM watched_dirs_states WHERE id=?1",
            crate::sql_params![id],
            |row| row.get::<_, String>(0),
        )?;
        name.map(|name| RootState::from_name(&name)).transpose()
    }

    /// Path of one root, or `None` when the row is gone.
    pub fn path_of(&self, id: i64) -> Result<Option<String>> {
        self.store.query_row(
            "SELECT path_to_dir FROM watched_dirs_states WHERE id=?1",
            crate::sql_params![id],
            |row| row.get(0),
        )
    }

    /// All configured paths, including roots mid-wipe. The Add operation
    /// dedupes against this set.
    pub fn paths(&self) -> Result<Vec<String>> {
        self.store
            .query("SELECT path_to_dir FROM watched_dirs", vec![], |row| {
                row.get(0)
            })
    }

    /// All known root ids.
    pub fn ids(&self) -> Result<HashSet<i64>> {
        Ok(self
            .store
            .query("SELECT id FROM watched_dirs", vec![], |row| row.get(0))?
            .into_iter()
            .collect())
    }

    /// Register a new root in state `indexing`.
    pub fn insert(&self, path: &str) -> Result<()> {
        self.store.exec(
            "INSERT INTO watched_dirs (path_to_dir, state_id) VALUES (?1, ?2)",
            crate::sql_params![path.to_string(), RootState::Indexing.state_id()],
        )
    }

    /// Hand the root to its engine for cleanup.
    pub fn mark_wiping(&self, id: i64) -> Result<()> {
        self.store.exec(
            "UPDATE watched_dirs SET state_id=?1 WHERE id=?2",
            crate::sql_params![RootState::Wiping.state_id(), id],
        )
    }

    /// Promote `indexing → updating` after a complete crawl. Any other
    /// state wins: the guard in the statement keeps a concurrent `wiping`
    /// transition from being overwritten.
    pub fn promote_to_updating(&self, id: i64) -> Result<()> {
        self.store.exec(
            "UPDATE watched_dirs SET state_id=?1 WHERE id=?2 AND state_id=?3",
            crate::sql_params![
                RootState::Updating.state_id(),
                id,
                RootState::Indexing.state_id()
            ],
        )
    }

    /// Drop the root's row entirely (end of wiping).
    pub fn delete(&self, id: i64) -> Result<()> {
        self.store.exec(
            "DELETE FROM watched_dirs WHERE id=?1",
            crate::sql_params![id],
        )
    }

    /// Force every root back to `indexing`. Run once at startup so a crawl
    /// reconciles the catalog with the on-disk truth after any crash.
    pub fn force_all_indexing(&self) -> Result<()> {
        self.store.exec(
            "UPDATE watched_dirs SET state_id=?1",
            crate::sql_params![RootState::Indexing.state_id()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::init_watched_schema;
    use crate::catalog::store::CADENCE_INSTANT;
    use crate::shutdown::ShutdownController;

    fn open_dirs() -> (tempfile::TempDir, WatchedDirs) {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(
            &dir.path().join("watched_dirs.db"),
            CADENCE_INSTANT,
            ShutdownController::new().subscribe(),
            init_watched_schema,
        )
        .unwrap();
        (dir, WatchedDirs::new(store))
    }

    fn only_id(dirs: &WatchedDirs) -> i64 {
        let roots = dirs.list().unwrap();
        assert_eq!(roots.len(), 1);
        roots[0].id
    }

    #[test]
    fn insert_starts_in_indexing() {
        let (_dir, dirs) = open_dirs();
        dirs.insert("/tmp/a").unwrap();

        let roots = dirs.list().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].path, "/tmp/a");
        assert_eq!(roots[0].state, RootState::Indexing);
    }

    #[test]
    fn promote_only_from_indexing() {
        let (_dir, dirs) = open_dirs();
        dirs.insert("/tmp/a").unwrap();
        let id = only_id(&dirs);

        dirs.promote_to_updating(id).unwrap();
        assert_eq!(dirs.state_of(id).unwrap(), Some(RootState::Updating));

        // A root already marked for wiping must stay wiping.
        dirs.mark_wiping(id).unwrap();
        dirs.promote_to_updating(id).unwrap();
        assert_eq!(dirs.state_of(id).unwrap(), Some(RootState::Wiping));
    }

    #[test]
    fn state_of_missing_row_is_none() {
        let (_dir, dirs) = open_dirs();
        assert_eq!(dirs.state_of(12345).unwrap(), None);
        assert_eq!(dirs.path_of(12345).unwrap(), None);
    }

    #[test]
    fn delete_removes_the_row() {
        let (_dir, dirs) = open_dirs();
        dirs.insert("/tmp/a").unwrap();
        let id = only_id(&dirs);

        dirs.delete(id).unwrap();
        assert!(dirs.list().unwrap().is_empty());
        assert!(dirs.ids().unwrap().is_empty());
    }

    #[test]
    fn force_all_indexing_resets_every_root() {
        let (_dir, dirs) = open_dirs();
        dirs.insert("/tmp/a").unwrap();
        dirs.insert("/tmp/b").unwrap();
        for root in dirs.list().unwrap() {
            dirs.mark_wiping(root.id).unwrap();
        }

        dirs.force_all_indexing().unwrap();
        for root in dirs.list().unwrap() {
            assert_eq!(root.state, RootState::Indexing);
        }
    }

    #[test]
    fn ids_and_paths_enumerate_all_rows() {
        let (_dir, dirs) = open_dirs();
        dirs.insert("/tmp/a").unwrap();
        dirs.insert("/tmp/b").unwrap();

        assert_eq!(dirs.ids().unwrap().len(), 2);
        let paths = dirs.paths().unwrap();
        assert!(paths.contains(&"/tmp/a".to_string()));
        assert!(paths.contains(&"/tmp/b".to_string()));
    }
}
