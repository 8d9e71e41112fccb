//! RPC operation handlers.
//!
//! Malformed input is a handler error returned to the caller as 4xx and
//! never fatal. Persistence errors keep their process-wide fatality and
//! route through the top-level handler like everywhere else.

use std::collections::HashSet;
use std::path::Path;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::RpcState;
use crate::fatal::or_exit;

/// Fixed liveness string for probes.
pub async fn health() -> &'static str {
    "filedex RPC server live!"
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub substr: String,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub name: String,
    pub size: i64,
    pub mtime_ns: i64,
    pub is_dir: bool,
}

/// Substring search on basenames.
pub async fn search(
    State(state): State<RpcState>,
    Json(req): Json<SearchRequest>,
) -> Json<Vec<SearchHit>> {
    let records = or_exit("rpc search", state.files.search(&req.substr));
    Json(
        records
            .into_iter()
            .map(|r| SearchHit {
                path: r.path_to_file,
                name: r.fname,
                size: r.size,
                mtime_ns: r.mtime_ns,
                is_dir: r.is_dir,
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub added: Vec<String>,
}

/// Register new watched roots. Paths already present are skipped; the
/// response lists only the paths actually added.
pub async fn add(
    State(state): State<RpcState>,
    Json(req): Json<AddRequest>,
) -> Result<Json<AddResponse>, (StatusCode, String)> {
    for path in &req.paths {
        if path.is_empty() || !Path::new(path).is_absolute() {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("watched roots must be absolute paths, got {path:?}"),
            ));
        }
    }

    let existing: HashSet<String> = or_exit("rpc add", state.watched.paths())
        .into_iter()
        .collect();
    let mut added = Vec::new();
    for path in req.paths {
        if existing.contains(&path) || added.contains(&path) {
            continue;
        }
        or_exit("rpc add", state.watched.insert(&path));
        tracing::info!(path = %path, "watched root added");
        added.push(path);
    }
    Ok(Json(AddResponse { added }))
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub removed: Vec<i64>,
}

/// Mark roots for wiping. Unknown ids are ignored; the response lists the
/// ids actually marked.
pub async fn remove(
    State(state): State<RpcState>,
    Json(req): Json<RemoveRequest>,
) -> Json<RemoveResponse> {
    let known = or_exit("rpc remove", state.watched.ids());
    let mut removed = Vec::new();
    for id in req.ids {
        if known.contains(&id) {
            or_exit("rpc remove", state.watched.mark_wiping(id));
            tracing::info!(dir_id = id, "watched root marked for removal");
            removed.push(id);
        }
    }
    Json(RemoveResponse { removed })
}

#[derive(Debug, Serialize)]
pub struct WatchedDirEntry {
    pub id: i64,
    pub path: String,
    pub state: String,
}

/// Enumerate the watched roots with their lifecycle states.
pub async fn watched_dirs(State(state): State<RpcState>) -> Json<Vec<WatchedDirEntry>> {
    let roots = or_exit("rpc watched-dirs", state.watched.list());
    Json(
        roots
            .into_iter()
            .map(|root| WatchedDirEntry {
                id: root.id,
                path: root.path,
                state: root.state.as_str().to_string(),
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopping: bool,
}

/// Invoke the process-wide shutdown broadcast.
pub async fn stop(State(state): State<RpcState>) -> Json<StopResponse> {
    tracing::info!("stop requested over RPC");
    state.shutdown.terminate();
    Json(StopResponse { stopping: true })
}
