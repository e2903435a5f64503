//! Sync engine for the JustShop list server
//!
//! Reconciles the local SQLite list with server snapshots delivered over a
//! WebSocket push channel, and sends local edits back over HTTP.
//!
//! ## Flow
//!
//! 1. Local edit: written to storage, observers notified, queued for the
//!    outbound worker
//! 2. Server change: full snapshot pushed; local rows not in it are
//!    dropped, the rest upserted
//! 3. Channel down: reconnect with backoff, poll `GET /v1/current`
//!    meanwhile
//!
//! ## Usage
//!
//! ```ignore
//! let engine = SyncEngine::new(repo, remote, settings, SyncOptions::default());
//! let handle = engine.start()?;
//! engine.add("Milk").await?;
//! handle.shutdown().await;
//! ```

mod backoff;
mod connectivity;
mod engine;
mod observers;
mod outbox;
mod reconcile;

pub use backoff::ReconnectPolicy;
pub use connectivity::Connectivity;
pub use engine::{SyncEngine, SyncError, SyncHandle, SyncOptions, SyncStatus};
pub use observers::{Observer, ObserverId, Observers};
pub use outbox::{OutboundOp, Outbox};
pub use reconcile::{reconcile, ConflictPolicy, ReconcileOutcome};
