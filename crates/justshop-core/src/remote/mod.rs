//! Remote client for the JustShop list server
//!
//! Point mutations go over HTTP, list snapshots arrive on a WebSocket push
//! channel.
//!
//! ## Protocol
//!
//! - `POST /v1/update` with a JSON item
//! - `DELETE /v1/delete-checked` (also the default "delete all" endpoint)
//! - `GET /v1/current` returns the full list (fallback polling)
//! - `GET /v1/ws` upgraded to a WebSocket; every text frame is a full
//!   snapshot, a JSON object keyed by item id. The client never sends.
//!
//! The remote client never reconnects on its own. The sync engine decides
//! when to open the next channel.

mod channel;
mod error;
mod http;
pub mod request;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{Item, Snapshot};

pub use error::RemoteError;
pub use http::HttpRemote;

/// Server operations the sync engine relies on
#[async_trait]
pub trait Remote: Send + Sync {
    /// Push one item's state to the server
    async fn apply_update(&self, item: &Item) -> Result<(), RemoteError>;

    /// Remove checked items on the server
    async fn delete_checked(&self) -> Result<(), RemoteError>;

    /// Remove every item on the server
    async fn delete_all(&self) -> Result<(), RemoteError>;

    /// Fetch the full list (fallback when the push channel is down)
    async fn fetch_snapshot(&self) -> Result<Snapshot, RemoteError>;

    /// Open a push subscription
    ///
    /// Resolves once the channel is established.
    async fn open_push_channel(&self) -> Result<PushChannel, RemoteError>;
}

/// Something that happened on an open push channel
#[derive(Debug)]
pub enum ChannelEvent {
    /// A full list arrived
    Snapshot(Snapshot),
    /// The channel is gone; no further events follow
    Lost(RemoteError),
}

/// An open push subscription
///
/// Yields snapshots until the first `Lost`, then only `None`. Dropping the
/// channel stops its reader task.
pub struct PushChannel {
    events: mpsc::Receiver<ChannelEvent>,
    reader: Option<JoinHandle<()>>,
    lost: bool,
}

impl PushChannel {
    /// Wrap an event receiver, optionally owning the task that feeds it
    pub fn new(events: mpsc::Receiver<ChannelEvent>, reader: Option<JoinHandle<()>>) -> Self {
        Self {
            events,
            reader,
            lost: false,
        }
    }

    /// Next event, with loss reported exactly once
    ///
    /// A feeder that disappears without saying goodbye counts as a close.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        if self.lost {
            return None;
        }

        let event = self
            .events
            .recv()
            .await
            .unwrap_or_else(|| ChannelEvent::Lost(RemoteError::Closed { reason: None }));

        if matches!(event, ChannelEvent::Lost(_)) {
            self.lost = true;
        }
        Some(event)
    }

    /// Whether loss has already been reported
    pub fn is_lost(&self) -> bool {
        self.lost
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
