use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::{KeyValueStore, Result, StoreError, migrations};

/// Durable [`KeyValueStore`] on a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;

        // WAL so a second process reading counters doesn't block writers
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&conn)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, new: &str) -> Result<bool> {
        // Each branch is one conditional statement, which SQLite applies atomically.
        self.with_conn(|conn| {
            let changed = match expected {
                Some(current) => conn.execute(
                    "UPDATE kv SET value = ?3, updated_at = datetime('now')
                     WHERE key = ?1 AND value = ?2",
                    params![key, current, new],
                )?,
                None => conn.execute(
                    "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
                    params![key, new],
                )?,
            };
            Ok(changed == 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn compare_and_swap_semantics() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.compare_and_swap("k", None, "1").unwrap());
        assert!(!store.compare_and_swap("k", None, "9").unwrap());
        assert!(!store.compare_and_swap("k", Some("5"), "9").unwrap());
        assert!(store.compare_and_swap("k", Some("1"), "2").unwrap());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn migrations_are_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", "1").unwrap();
        store
            .with_conn(|conn| {
                migrations::run(conn).map_err(|e| StoreError::Unavailable(e.to_string()))
            })
            .unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn reopening_a_file_keeps_values() {
        let path = std::env::temp_dir().join(format!("mingle_store_test_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("mingle:rematch:m1", "1").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("mingle:rematch:m1").unwrap().as_deref(), Some("1"));

        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
