//! Storage layer
//!
//! Local SQLite cache of the shopping list.
//!
//! - **repository**: upserts, bulk deletes and the live "all items" view
//! - **schema**: table definitions and version tracking
//! - **error**: typed storage errors

pub mod error;
pub mod repository;
pub mod schema;

pub use error::{DataDirFault, StorageError, StorageResult};
pub use repository::{ItemRepository, LiveView};
pub use schema::{migrate, schema_version, SCHEMA_VERSION};
