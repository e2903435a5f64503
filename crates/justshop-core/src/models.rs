//! Data models for JustShop
//!
//! Items are immutable values: an edit produces a new `Item` with the same
//! `id`. A `Snapshot` is the server's complete list at one instant.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// A single shopping list entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    /// Stable identifier, never changes across edits
    pub id: Uuid,
    /// What to buy
    pub content: String,
    /// Whether the item has been ticked off
    pub checked: bool,
    /// Creation / last-touch instant in milliseconds since the epoch
    pub timestamp: i64,
}

impl Item {
    /// Create a new unchecked item stamped with the current time
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            checked: false,
            timestamp: now_millis(),
        }
    }

    /// Create an item with every field given (for loading from storage)
    pub fn with_id(id: Uuid, content: impl Into<String>, checked: bool, timestamp: i64) -> Self {
        Self {
            id,
            content: content.into(),
            checked,
            timestamp,
        }
    }

    /// Same item with a new checked state and a refreshed timestamp
    pub fn with_checked(&self, checked: bool) -> Self {
        Self {
            checked,
            timestamp: now_millis(),
            ..self.clone()
        }
    }

    /// Same item with new content and a refreshed timestamp
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: now_millis(),
            ..self.clone()
        }
    }

    /// Same item with only the timestamp refreshed
    pub fn touched(&self) -> Self {
        Self {
            timestamp: now_millis(),
            ..self.clone()
        }
    }
}

/// Complete server-side list keyed by item id
///
/// A snapshot is total: an id missing from it has been deleted remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    items: HashMap<Uuid, Item>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a push/poll payload: a JSON object keyed by item id
    ///
    /// Entries are keyed by the item's own `id`; a key that disagrees with it
    /// is logged and ignored.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::keyed(serde_json::from_str(payload)?))
    }

    /// Like [`Snapshot::from_json`] for raw bytes; invalid UTF-8 is an error
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self::keyed(serde_json::from_slice(payload)?))
    }

    fn keyed(raw: HashMap<String, Item>) -> Self {
        let mut items = HashMap::with_capacity(raw.len());
        for (key, item) in raw {
            if key != item.id.to_string() {
                warn!("Snapshot key {} does not match item id {}", key, item.id);
            }
            items.insert(item.id, item);
        }
        Self { items }
    }

    /// Encode in the wire shape (object keyed by id)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.items)
    }

    pub fn insert(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    pub fn get(&self, id: &Uuid) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The key set `K` used to drop rows the server no longer has
    pub fn ids(&self) -> HashSet<Uuid> {
        self.items.keys().copied().collect()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items.into_values().collect()
    }
}

impl FromIterator<Item> for Snapshot {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|item| (item.id, item)).collect(),
        }
    }
}

/// Current wall-clock time in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
