//! SQLite schema for the local item cache
//!
//! One table keyed by item id. The server is authoritative; this table is
//! what the client shows while offline. The version lives in
//! `PRAGMA user_version`.

use rusqlite::{Connection, Result};

pub const SCHEMA_VERSION: i32 = 1;

/// Steps indexed by the version they upgrade *from*
const MIGRATIONS: &[&str] = &[
    // 0 -> 1
    r#"
    CREATE TABLE IF NOT EXISTS shopping_items (
        id        TEXT PRIMARY KEY,
        content   TEXT NOT NULL,
        checked   INTEGER NOT NULL DEFAULT 0,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_shopping_items_timestamp ON shopping_items(timestamp);
    CREATE INDEX IF NOT EXISTS idx_shopping_items_checked ON shopping_items(checked);
    "#,
];

pub fn schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Bring the database up to [`SCHEMA_VERSION`]
///
/// Each pending step runs in its own transaction together with the version
/// bump. A database newer than this build is left alone.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;

    for (from, sql) in MIGRATIONS.iter().enumerate().skip(current.max(0) as usize) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", from as i32 + 1)?;
        tx.commit()?;
        tracing::debug!(to = from + 1, "Migrated item store");
    }

    Ok(())
}
