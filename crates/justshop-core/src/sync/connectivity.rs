//! Process-visible "is the server reachable" flag

use std::sync::Arc;

use tokio::sync::watch;

/// Shared connectivity signal
///
/// Cloning yields another handle on the same flag. Only the sync engine
/// writes it; anyone can read or subscribe.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Start out disconnected
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver that wakes on every flip
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Store a new value; returns whether it flipped
    pub(crate) fn set(&self, connected: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == connected {
                return false;
            }
            *current = connected;
            true
        })
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}
