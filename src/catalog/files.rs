//! Typed operations on the files catalog.

use std::sync::Arc;

use anyhow::Result;

use super::store::CatalogStore;

/// A file or directory observed under some watched root.
///
/// `path_to_file` is the parent directory path including its trailing
/// separator; `fname` is the basename. The pair is globally unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub dir_id: i64,
    pub path_to_file: String,
    pub fname: String,
    pub size: i64,
    pub mtime_ns: i64,
    pub is_dir: bool,
}

/// Handle to the `files` table of a [`CatalogStore`].
#[derive(Clone)]
pub struct FilesTable {
    store: Arc<CatalogStore>,
}

impl FilesTable {
    pub fn new(store: Arc<CatalogStore>) -> Self {
        Self { store }
    }

    /// Insert the record, refreshing `size` and `mtime_ns` when the
    /// `(path_to_file, fname)` key already exists.
    pub fn upsert(&self, record: &FileRecord) -> Result<()> {
        self.store.exec(
            "INSERT INTO files (dir_id, path_to_file, fname, size, mtime_ns, is_dir) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (path_to_file, fname) DO UPDATE SET size=?4, mtime_ns=?5",
            crate::sql_params![
                record.dir_id,
                record.path_to_file.clone(),
                record.fname.clone(),
                record.size,
                record.mtime_ns,
                record.is_dir
            ],
        )
    }

    /// Delete the record keyed by `(path_to_file, fname)`, if present.
    pub fn delete(&self, path_to_file: &str, fname: &str) -> Result<()> {
        self.store.exec(
            "DELETE FROM files WHERE path_to_file=?1 AND fname=?2",
            crate::sql_params![path_to_file.to_string(), fname.to_string()],
        )
    }

    /// Delete every record owned by the given root.
    pub fn delete_dir(&self, dir_id: i64) -> Result<()> {
        self.store.exec(
            "DELETE FROM files WHERE dir_id=?1",
            crate::sql_params![dir_id],
        )
    }

    /// Uniqueness keys of every record owned by the given root, for the
    /// stale-row sweep at the start of indexing.
    pub fn keys_for_dir(&self, dir_id: i64) -> Result<Vec<(String, String)>> {
        self.store.query(
            "SELECT path_to_file, fname FROM files WHERE dir_id=?1",
            crate::sql_params![dir_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    /// Substring search on basenames. Case-sensitivity is whatever the
    /// underlying store applies to `LIKE`.
    pub fn search(&self, substr: &str) -> Result<Vec<FileRecord>> {
        self.store.query(
            "SELECT dir_id, path_to_file, fname, size, mtime_ns, is_dir \
             FROM files WHERE fname LIKE '%'||?1||'%'",
            crate::sql_params![substr.to_string()],
            |row| {
                Ok(FileRecord {
                    dir_id: row.get(0)?,
                    path_to_file: row.get(1)?,
                    fname: row.get(2)?,
                    size: row.get(3)?,
                    mtime_ns: row.get(4)?,
                    is_dir: row.get(5)?,
                })
            },
        )
    }

    /// Total number of records owned by the given root.
    #[cfg(test)]
    pub fn count_for_dir(&self, dir_id: i64) -> Result<i64> {
        Ok(self
            .store
            .query_row(
                "SELECT COUNT(*) FROM files WHERE dir_id=?1",
                crate::sql_params![dir_id],
                |row| row.get(0),
            )?
            .unwrap_or(0))
    }
}
