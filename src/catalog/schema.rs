//! Idempotent schema definitions for the two catalog databases.
//!
//! The state ids in `states` are part of the persisted contract; external
//! tooling addresses them by number.

use anyhow::Result;
use rusqlite::Connection;

/// `files.db`: one row per file or directory observed under a watched
/// root. `(path_to_file, fname)` is unique across the whole table, not
/// scoped by `dir_id`.
pub fn init_files_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            dir_id       INTEGER NOT NULL,
            path_to_file TEXT NOT NULL,
            fname        TEXT NOT NULL,
            size         INTEGER NOT NULL,
            mtime_ns     INTEGER NOT NULL,
            is_dir       INTEGER NOT NULL,
            UNIQUE (path_to_file, fname)
        );
        "#,
    )?;
    Ok(())
}

/// `watched_dirs.db`: the configured root set, a lookup table of lifecycle
/// states, and a joined view used by everything that reads root state.
pub fn init_watched_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS states (
            id   INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );
        INSERT OR IGNORE INTO states (id, name)
            VALUES (1, 'indexing'), (2, 'wiping'), (3, 'updating');

        CREATE TABLE IF NOT EXISTS watched_dirs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            path_to_dir TEXT NOT NULL,
            state_id    INTEGER NOT NULL REFERENCES states (id)
        );

        CREATE VIEW IF NOT EXISTS watched_dirs_states (id, path_to_dir, state) AS
            SELECT watched_dirs.id, watched_dirs.path_to_dir, states.name
            FROM watched_dirs
            JOIN states ON watched_dirs.state_id = states.id;
        "#,
    )?;
    Ok(())
}
