//! Outbound operations and the retry outbox
//!
//! Failed operations wait here until the push channel next opens. The outbox
//! lives in memory only; anything still pending at exit is lost, and the
//! next snapshot from the server wins.

use std::fmt;

use tracing::debug;

use crate::models::Item;
use crate::remote::{Remote, RemoteError};

/// A mutation the server still has to hear about
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundOp {
    Update(Item),
    DeleteChecked,
    DeleteAll,
}

impl OutboundOp {
    pub async fn send(&self, remote: &dyn Remote) -> Result<(), RemoteError> {
        match self {
            OutboundOp::Update(item) => remote.apply_update(item).await,
            OutboundOp::DeleteChecked => remote.delete_checked().await,
            OutboundOp::DeleteAll => remote.delete_all().await,
        }
    }

    fn is_bulk_delete(&self) -> bool {
        matches!(self, OutboundOp::DeleteChecked | OutboundOp::DeleteAll)
    }
}

impl fmt::Display for OutboundOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundOp::Update(item) => write!(f, "update {}", item.id),
            OutboundOp::DeleteChecked => write!(f, "delete-checked"),
            OutboundOp::DeleteAll => write!(f, "delete-all"),
        }
    }
}

/// Ordered queue of failed operations
///
/// Updates to the same item collapse into the newest one, as long as no bulk
/// delete sits between them. A delete-all makes everything before it moot,
/// and a delete-checked straight after another bulk delete is dropped.
#[derive(Debug, Default)]
pub struct Outbox {
    ops: Vec<OutboundOp>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: OutboundOp) {
        match op {
            OutboundOp::DeleteAll => {
                debug!("Outbox: delete-all supersedes {} pending ops", self.ops.len());
                self.ops.clear();
                self.ops.push(op);
            }
            // Nothing is checked right after a bulk delete
            OutboundOp::DeleteChecked
                if self.ops.last().is_some_and(OutboundOp::is_bulk_delete) => {}
            OutboundOp::DeleteChecked => self.ops.push(op),
            OutboundOp::Update(item) => {
                let since_last_delete = self
                    .ops
                    .iter()
                    .rposition(OutboundOp::is_bulk_delete)
                    .map_or(0, |i| i + 1);

                let pending = self.ops[since_last_delete..].iter_mut().find(
                    |pending| matches!(pending, OutboundOp::Update(p) if p.id == item.id),
                );

                match pending {
                    Some(OutboundOp::Update(existing)) => {
                        if item.timestamp >= existing.timestamp {
                            *existing = item;
                        }
                    }
                    _ => self.ops.push(OutboundOp::Update(item)),
                }
            }
        }
    }

    /// Forget pending updates made obsolete by one that just went through
    pub fn settle(&mut self, sent: &OutboundOp) {
        if let OutboundOp::Update(item) = sent {
            self.ops.retain(|pending| match pending {
                OutboundOp::Update(p) => p.id != item.id || p.timestamp > item.timestamp,
                _ => true,
            });
        }
    }

    /// Remove and return everything, oldest first
    pub fn take(&mut self) -> Vec<OutboundOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
