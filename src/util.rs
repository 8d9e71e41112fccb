//! Shared helpers for path splitting and timestamps.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Split a full path into `(path_to_file, fname)` at the final separator.
///
/// The directory part keeps its trailing separator; a path with no
/// separator yields an empty directory part. This is the canonical form of
/// the `(path_to_file, fname)` uniqueness key in the files catalog.
pub fn split_path(path: &Path) -> (String, String) {
    let full = path.to_string_lossy();
    match full.rfind(std::path::MAIN_SEPARATOR) {
        Some(idx) => (full[..=idx].to_string(), full[idx + 1..].to_string()),
        None => (String::new(), full.into_owned()),
    }
}

/// Modification time as nanoseconds since the Unix epoch.
///
/// Times before the epoch come out negative, matching what the OS reports
/// for such files.
pub fn mtime_ns(mtime: SystemTime) -> i64 {
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_nanos() as i64,
        Err(before) => -(before.duration().as_nanos() as i64),
    }
}
