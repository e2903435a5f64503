//! Snapshot reconciliation
//!
//! A snapshot is the server's whole list. Applying one drops every local row
//! the server no longer has, then upserts everything it does have.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::Snapshot;
use crate::storage::{ItemRepository, StorageResult};

/// How a snapshot treats local rows it disagrees with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The snapshot always overwrites local rows
    #[default]
    ServerWins,
    /// Local rows with a strictly newer timestamp survive the snapshot
    NewestTimestamp,
}

/// What a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Local rows missing from the snapshot
    pub removed: usize,
    /// Snapshot items written locally
    pub written: usize,
}

/// Make the repository match `snapshot`
///
/// Deletions always follow the snapshot, whatever the policy.
pub fn reconcile(
    repo: &ItemRepository,
    snapshot: &Snapshot,
    policy: ConflictPolicy,
) -> StorageResult<ReconcileOutcome> {
    let removed = repo.delete_all_except(&snapshot.ids())?;

    let items: Vec<_> = snapshot.items().cloned().collect();
    let written = match policy {
        ConflictPolicy::ServerWins => repo.insert_many(&items)?,
        ConflictPolicy::NewestTimestamp => repo.insert_many_unless_newer(&items)?,
    };

    debug!(
        "Reconciled snapshot of {} items: {} removed, {} written",
        snapshot.len(),
        removed,
        written
    );
    Ok(ReconcileOutcome { removed, written })
}
