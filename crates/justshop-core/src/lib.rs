//! JustShop Core Library
//!
//! Offline-first client for a shared shopping list. The local SQLite copy
//! is always readable and writable; a sync engine keeps it in step with the
//! list server whenever the server is reachable.
//!
//! # Architecture
//!
//! - **SQLite**: local copy of the list, republished after every write
//! - **Push channel**: the server sends its whole list after every change
//! - **HTTP**: local edits go out one request at a time
//!
//! The server is the authority. A snapshot replaces whatever the local copy
//! holds, except for rows that the configured conflict policy protects.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let settings = Arc::new(SharedSettings::new(config.clone()));
//! let repo = Arc::new(ItemRepository::open(&config.sqlite_path())?);
//! let remote = Arc::new(HttpRemote::new(settings.clone())?);
//!
//! let engine = SyncEngine::new(repo, remote, settings, SyncOptions::from_config(&config));
//! let handle = engine.start()?;
//! engine.add("Milk").await?;
//! handle.shutdown().await;
//! ```
//!
//! # Modules
//!
//! - `sync`: Sync engine, connectivity and observers (main entry point)
//! - `models`: Items and snapshots
//! - `storage`: SQLite item repository
//! - `remote`: HTTP and WebSocket client for the list server
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::{Config, SettingsProvider, SharedSettings};
pub use models::{Item, Snapshot};
pub use remote::{HttpRemote, Remote, RemoteError};
pub use storage::{ItemRepository, LiveView, StorageError};
pub use sync::{
    ConflictPolicy, Connectivity, ReconnectPolicy, SyncEngine, SyncHandle, SyncOptions, SyncStatus,
};
