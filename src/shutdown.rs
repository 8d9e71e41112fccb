//! Process-wide shutdown broadcast.
//!
//! One controller is owned by the process root; every long-running task
//! holds a [`ShutdownSignal`] handle. `terminate()` is a one-shot: it
//! releases all current and future observers and cannot be re-armed.

use tokio::sync::watch;

/// Sending half of the shutdown broadcast.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Observing half. Cloneable; every clone is released exactly once when
/// the controller terminates, regardless of when it subscribed.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a new observer handle.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal shutdown. Idempotent.
    pub fn terminate(&self) {
        self.tx.send_replace(true);
    }

    #[allow(dead_code)] // state probe, exercised in tests
    pub fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Resolve once shutdown has been signalled. Returns immediately if it
    /// already was; a dropped controller counts as signalled.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Non-blocking check for synchronous observers.
    pub fn is_signalled(&self) -> bool {
        *self.rx.borrow()
    }
}
