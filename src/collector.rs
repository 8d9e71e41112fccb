//! Filesystem-event collection for one watched root.
//!
//! A collector subscribes to recursive change events under its root and
//! exposes them as an ordered buffer the engine polls one event at a time.
//! The watcher callback runs on the watcher's own thread and appends into
//! the buffer; the engine pops from the front.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Buffer capacity. An event arriving on a full buffer is a fatal
/// overflow: the daemon crashes rather than silently dropping updates.
pub const EVENT_BUFFER: usize = 65_536;

/// What the engine needs to know about an event: removals delete the
/// record, everything else stats the path and upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Remove,
    Touch,
}

#[derive(Debug, Clone)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

/// Per-root event subscription with a bounded FIFO buffer.
///
/// Dropping the collector stops the watcher and discards pending events.
pub struct EventCollector {
    buffer: Arc<Mutex<VecDeque<FsEvent>>>,
    watcher: Option<RecommendedWatcher>,
}

impl EventCollector {
    /// Subscribe to recursive change events under `root`.
    ///
    /// Subscription failure (permissions, missing path) is degraded mode:
    /// a warning is logged and the returned collector has an empty buffer
    /// that never fills. The engine keeps running without live updates.
    pub fn subscribe(root: &Path) -> Self {
        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let sink = buffer.clone();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => collect(&sink, event),
            Err(err) => tracing::warn!("file system watcher error: {err}"),
        });

        let watcher = match watcher {
            Ok(mut watcher) => match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => Some(watcher),
                Err(err) => {
                    tracing::warn!(
                        "handling file system events failed for {}: {err}",
                        root.display()
                    );
                    None
                }
            },
            Err(err) => {
                tracing::warn!(
                    "creating file system watcher failed for {}: {err}",
                    root.display()
                );
                None
            }
        };

        Self { buffer, watcher }
    }

    /// Pop the oldest pending event.
    pub fn pop(&self) -> Option<FsEvent> {
        locked(&self.buffer).pop_front()
    }

    /// Whether the subscription actually took; `false` means degraded
    /// mode with no live updates for this root.
    pub fn is_live(&self) -> bool {
        self.watcher.is_some()
    }
}

fn locked(buffer: &Mutex<VecDeque<FsEvent>>) -> MutexGuard<'_, VecDeque<FsEvent>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Flatten a watcher event into per-path entries and append them.
fn collect(buffer: &Arc<Mutex<VecDeque<FsEvent>>>, event: Event) {
    let kind = match event.kind {
        EventKind::Remove(_) => FsEventKind::Remove,
        _ => FsEventKind::Touch,
    };
    let mut buf = locked(buffer);
    for path in event.paths {
        if let Err(err) = append(&mut buf, FsEvent { path, kind }, EVENT_BUFFER) {
            crate::fatal::unrecoverable("event collector", err);
        }
    }
}

fn append(buffer: &mut VecDeque<FsEvent>, event: FsEvent, capacity: usize) -> Result<()> {
    if buffer.len() >= capacity {
        bail!("event buffer full ({capacity} events)");
    }
    buffer.push_back(event);
    Ok(())
}
