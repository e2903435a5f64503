//! SQLite-backed item repository
//!
//! Owns the persisted rows and republishes the full item set after every
//! mutation. All access goes through one connection behind a mutex, and each
//! mutation runs in its own transaction, so concurrent writers are
//! serialized.
//!
//! ## Live view
//!
//! The current item set is published on a `watch` channel. Subscribers only
//! ever see the latest value; intermediate states may be skipped.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use futures_util::Stream;
use rusqlite::{params, Connection, Transaction};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::Item;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::migrate;

const SELECT_ITEMS: &str =
    "SELECT id, content, checked, timestamp FROM shopping_items ORDER BY timestamp, id";

/// Durable store for shopping list items
pub struct ItemRepository {
    conn: Mutex<Connection>,
    live: watch::Sender<Vec<Item>>,
}

impl ItemRepository {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::data_dir(parent, e))?;
            }
        }

        let mut conn = Connection::open(path)?;
        migrate(&mut conn)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        let items = load_all(&conn)?;
        let (live, _) = watch::channel(items);
        Ok(Self {
            conn: Mutex::new(conn),
            live,
        })
    }

    // ==================== Live View ====================

    /// Subscribe to the current item set
    ///
    /// Every call returns an independent view starting at the current value.
    pub fn live_view(&self) -> LiveView {
        LiveView {
            rx: self.live.subscribe(),
        }
    }

    // ==================== Queries ====================

    /// All items, oldest first
    pub fn all(&self) -> StorageResult<Vec<Item>> {
        let conn = self.lock()?;
        load_all(&conn)
    }

    /// Get an item by ID
    pub fn get(&self, id: Uuid) -> StorageResult<Option<Item>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, checked, timestamp FROM shopping_items WHERE id = ?",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;

        match rows.next()? {
            Some(row) => Ok(Some(row_to_item(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
            )?)),
            None => Ok(None),
        }
    }

    /// Items whose id starts with `prefix`
    pub fn find_by_prefix(&self, prefix: &str) -> StorageResult<Vec<Item>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, checked, timestamp FROM shopping_items WHERE id LIKE ? || '%' ORDER BY timestamp, id",
        )?;
        collect_items(&mut stmt, params![prefix.to_lowercase()])
    }

    /// Number of stored items
    pub fn count(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM shopping_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ==================== Mutations ====================

    /// Upsert a single item
    pub fn insert(&self, item: &Item) -> StorageResult<()> {
        self.insert_many(std::slice::from_ref(item)).map(|_| ())
    }

    /// Upsert every item, replacing rows with the same id
    pub fn insert_many(&self, items: &[Item]) -> StorageResult<usize> {
        self.mutate("insert_many", |tx| {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO shopping_items (id, content, checked, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for item in items {
                stmt.execute(params![
                    item.id.to_string(),
                    item.content,
                    item.checked,
                    item.timestamp
                ])?;
            }
            Ok(items.len())
        })
    }

    /// Upsert items, but keep local rows whose timestamp is strictly newer
    ///
    /// Returns the number of rows written.
    pub fn insert_many_unless_newer(&self, items: &[Item]) -> StorageResult<usize> {
        self.mutate("insert_many_unless_newer", |tx| {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO shopping_items (id, content, checked, timestamp)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    checked = excluded.checked,
                    timestamp = excluded.timestamp
                WHERE excluded.timestamp >= shopping_items.timestamp
                "#,
            )?;
            let mut written = 0;
            for item in items {
                written += stmt.execute(params![
                    item.id.to_string(),
                    item.content,
                    item.checked,
                    item.timestamp
                ])?;
            }
            Ok(written)
        })
    }

    /// Delete every row whose id is not in `keep`
    ///
    /// Returns the number of rows removed.
    pub fn delete_all_except(&self, keep: &HashSet<Uuid>) -> StorageResult<usize> {
        self.mutate("delete_all_except", |tx| {
            let stale: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM shopping_items")?;
                let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut stale = Vec::new();
                for id in ids {
                    let id = id?;
                    let keep_row = Uuid::parse_str(&id)
                        .map(|uuid| keep.contains(&uuid))
                        .unwrap_or(false);
                    if !keep_row {
                        stale.push(id);
                    }
                }
                stale
            };

            let mut stmt = tx.prepare("DELETE FROM shopping_items WHERE id = ?")?;
            for id in &stale {
                stmt.execute(params![id])?;
            }
            Ok(stale.len())
        })
    }

    /// Delete every row
    pub fn delete_all(&self) -> StorageResult<usize> {
        self.mutate("delete_all", |tx| {
            Ok(tx.execute("DELETE FROM shopping_items", [])?)
        })
    }

    /// Delete every checked row
    pub fn delete_where_checked(&self) -> StorageResult<usize> {
        self.mutate("delete_where_checked", |tx| {
            Ok(tx.execute("DELETE FROM shopping_items WHERE checked = 1", [])?)
        })
    }

    /// Run `op` in a transaction, then republish the item set
    ///
    /// The live view is re-emitted even when nothing changed. Once the
    /// transaction commits the call succeeds; a failure to re-read the rows
    /// only leaves the live view stale.
    fn mutate<T>(
        &self,
        name: &str,
        op: impl FnOnce(&Transaction<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = op(&tx)?;
        tx.commit()?;

        match load_all(&conn) {
            Ok(items) => {
                debug!("{} committed, {} items", name, items.len());
                self.live.send_replace(items);
            }
            Err(e) => warn!("{} committed but the live view was not refreshed: {}", name, e),
        }
        Ok(result)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

/// Latest-value view of the item set
///
/// Cloning yields an independent subscriber.
#[derive(Debug, Clone)]
pub struct LiveView {
    rx: watch::Receiver<Vec<Item>>,
}

impl LiveView {
    /// Current item set
    pub fn latest(&self) -> Vec<Item> {
        self.rx.borrow().clone()
    }

    /// Wait for the next emission
    ///
    /// Returns `None` once the repository is gone.
    pub async fn changed(&mut self) -> Option<Vec<Item>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Stream of item sets, starting with the current one
    pub fn into_stream(self) -> impl Stream<Item = Vec<Item>> {
        futures_util::stream::unfold((self, true), |(mut view, first)| async move {
            if first {
                let items = view.rx.borrow_and_update().clone();
                return Some((items, (view, false)));
            }
            let items = view.changed().await?;
            Some((items, (view, false)))
        })
    }
}

fn load_all(conn: &Connection) -> StorageResult<Vec<Item>> {
    let mut stmt = conn.prepare(SELECT_ITEMS)?;
    collect_items(&mut stmt, [])
}

fn collect_items(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> StorageResult<Vec<Item>> {
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, bool>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (id, content, checked, timestamp) = row?;
        items.push(row_to_item(id, content, checked, timestamp)?);
    }
    Ok(items)
}

fn row_to_item(id: String, content: String, checked: bool, timestamp: i64) -> StorageResult<Item> {
    let uuid = Uuid::parse_str(&id).map_err(|e| StorageError::InvalidRow {
        id: id.clone(),
        details: e.to_string(),
    })?;
    Ok(Item::with_id(uuid, content, checked, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn item(content: &str, checked: bool, timestamp: i64) -> Item {
        Item::with_id(Uuid::new_v4(), content, checked, timestamp)
    }

    fn ids(items: &[Item]) -> HashSet<Uuid> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_insert_and_get() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let milk = item("Milk", false, 1);

        repo.insert(&milk).unwrap();

        assert_eq!(repo.get(milk.id).unwrap(), Some(milk.clone()));
        assert_eq!(repo.count().unwrap(), 1);
        assert!(repo.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let milk = item("Milk", false, 1);
        repo.insert(&milk).unwrap();

        // Older timestamp still wins at this layer
        let edited = Item::with_id(milk.id, "Oat milk", true, 0);
        repo.insert(&edited).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.get(milk.id).unwrap(), Some(edited));
    }

    #[test]
    fn test_all_is_ordered_by_timestamp() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let late = item("Late", false, 30);
        let early = item("Early", false, 10);
        let middle = item("Middle", false, 20);
        repo.insert_many(&[late, early, middle]).unwrap();

        let contents: Vec<String> = repo.all().unwrap().into_iter().map(|i| i.content).collect();
        assert_eq!(contents, vec!["Early", "Middle", "Late"]);
    }

    #[test]
    fn test_delete_all_except_then_insert_leaves_exact_key_set() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let a = item("A", false, 1);
        let b = item("B", false, 2);
        let c = item("C", true, 3);
        repo.insert_many(&[a.clone(), b.clone(), c]).unwrap();

        let d = item("D", false, 4);
        let keep = vec![a.clone(), d.clone()];
        let removed = repo.delete_all_except(&ids(&keep)).unwrap();
        repo.insert_many(&keep).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(ids(&repo.all().unwrap()), ids(&keep));
    }

    #[test]
    fn test_delete_all_except_empty_set_clears() {
        let repo = ItemRepository::open_in_memory().unwrap();
        repo.insert_many(&[item("A", false, 1), item("B", true, 2)])
            .unwrap();

        repo.delete_all_except(&HashSet::new()).unwrap();

        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_where_checked() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let a = item("A", true, 1);
        let b = item("B", false, 2);
        repo.insert_many(&[a, b.clone()]).unwrap();

        assert_eq!(repo.delete_where_checked().unwrap(), 1);
        assert_eq!(repo.all().unwrap(), vec![b]);
    }

    #[test]
    fn test_delete_all() {
        let repo = ItemRepository::open_in_memory().unwrap();
        repo.insert_many(&[item("A", true, 1), item("B", false, 2)])
            .unwrap();

        assert_eq!(repo.delete_all().unwrap(), 2);
        assert!(repo.all().unwrap().is_empty());
    }

    #[test]
    fn test_insert_many_unless_newer_keeps_newer_local_rows() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let local = item("Local edit", true, 200);
        repo.insert(&local).unwrap();

        let stale = Item::with_id(local.id, "Server copy", false, 100);
        let fresh = item("New from server", false, 150);
        let written = repo
            .insert_many_unless_newer(&[stale, fresh.clone()])
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(repo.get(local.id).unwrap(), Some(local));
        assert_eq!(repo.get(fresh.id).unwrap(), Some(fresh));
    }

    #[test]
    fn test_insert_many_unless_newer_accepts_equal_or_newer() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let local = item("Local", false, 100);
        repo.insert(&local).unwrap();

        let same_time = Item::with_id(local.id, "Server", true, 100);
        repo.insert_many_unless_newer(&[same_time.clone()]).unwrap();

        assert_eq!(repo.get(local.id).unwrap(), Some(same_time));
    }

    #[test]
    fn test_find_by_prefix() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let milk = item("Milk", false, 1);
        repo.insert_many(&[milk.clone(), item("Eggs", false, 2)])
            .unwrap();

        let prefix = &milk.id.to_string()[..8];
        let found = repo.find_by_prefix(prefix).unwrap();
        assert_eq!(found, vec![milk]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("justshop.db");
        let milk = item("Milk", false, 1);

        {
            let repo = ItemRepository::open(&path).unwrap();
            repo.insert(&milk).unwrap();
        }

        let repo = ItemRepository::open(&path).unwrap();
        assert_eq!(repo.all().unwrap(), vec![milk.clone()]);
        assert_eq!(repo.live_view().latest(), vec![milk]);
    }

    #[tokio::test]
    async fn test_live_view_reemits_after_every_mutation() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let mut view = repo.live_view();
        assert!(view.latest().is_empty());

        let milk = item("Milk", false, 1);
        repo.insert(&milk).unwrap();
        assert_eq!(view.changed().await, Some(vec![milk.clone()]));

        // A no-op mutation still re-emits
        repo.delete_where_checked().unwrap();
        assert_eq!(view.changed().await, Some(vec![milk]));
    }

    #[tokio::test]
    async fn test_live_view_stream_starts_with_current_value() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let milk = item("Milk", false, 1);
        repo.insert(&milk).unwrap();

        let mut stream = Box::pin(repo.live_view().into_stream());
        assert_eq!(stream.next().await, Some(vec![milk.clone()]));

        repo.delete_all().unwrap();
        assert_eq!(stream.next().await, Some(vec![]));
    }

    #[test]
    fn test_committed_write_succeeds_when_reread_fails() {
        let repo = ItemRepository::open_in_memory().unwrap();
        let before = repo.live_view().latest();
        repo.lock()
            .unwrap()
            .execute(
                "INSERT INTO shopping_items (id, content, checked, timestamp) VALUES ('garbage', 'X', 0, 0)",
                [],
            )
            .unwrap();

        let milk = item("Milk", false, 1);
        repo.insert(&milk).unwrap();

        let stored: i64 = repo
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM shopping_items WHERE id = ?",
                [milk.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored, 1);
        assert_eq!(repo.live_view().latest(), before);
    }

    #[test]
    fn test_concurrent_writers() {
        let repo = Arc::new(ItemRepository::open_in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        repo.insert(&item(&format!("{}-{}", n, i), i % 2 == 0, i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(repo.count().unwrap(), 200);
        assert_eq!(repo.live_view().latest().len(), 200);
    }
}
