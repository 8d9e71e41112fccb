//! Transactional persistence for the file catalog and the watched-root
//! configuration.
//!
//! Two databases, two write disciplines: `files.db` is written through a
//! batched writer thread committing on a fixed cadence, `watched_dirs.db`
//! is written instantly. [`FilesTable`] and [`WatchedDirs`] are the typed
//! table handles; [`CatalogStore`] is the shared low-level store.

mod files;
mod roots;
mod schema;
mod store;

pub use files::{FileRecord, FilesTable};
pub use roots::{RootState, WatchedDirs, WatchedRoot};
pub use schema::{init_files_schema, init_watched_schema};
pub use store::{CatalogStore, CADENCE_INSTANT};
