//! Key-value backends for the on-device store.
//!
//! [`OfflineStorage`](crate::OfflineStorage) only ever talks to a [`KvStore`];
//! the SQLite backend is what ships, the in-memory one backs tests and
//! ephemeral sessions.

use crate::error::StorageResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A string-keyed store of string values.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Inserts or replaces the value under `key`.
    fn put(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// All entries whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>>;

    /// Removes every entry.
    fn clear(&self) -> StorageResult<()>;

    /// Approximate bytes held (keys plus values).
    fn size_bytes(&self) -> StorageResult<u64>;
}

// ── In-memory ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries().remove(key).is_some())
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        Ok(self
            .entries()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.entries().clear();
        Ok(())
    }

    fn size_bytes(&self) -> StorageResult<u64> {
        Ok(self
            .entries()
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum())
    }
}

// ── SQLite ───────────────────────────────────────────────────────

/// SQLite-backed store. Several named stores can share one database file;
/// each only sees its own rows.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    name: String,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path, name: impl Into<String>) -> StorageResult<Self> {
        Self::with_connection(Connection::open(path)?, name)
    }

    /// Opens an in-memory SQLite store (for testing).
    pub fn open_in_memory(name: impl Into<String>) -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, name)
    }

    fn with_connection(conn: Connection, name: impl Into<String>) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_records (
                store TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (store, key)
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            name: name.into(),
        })
    }

    /// The store's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM kv_records WHERE store = ?1 AND key = ?2",
                params![self.name, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv_records (store, key, value) VALUES (?1, ?2, ?3)",
            params![self.name, key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM kv_records WHERE store = ?1 AND key = ?2",
            params![self.name, key],
        )?;
        Ok(removed > 0)
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, value FROM kv_records
             WHERE store = ?1 AND substr(key, 1, length(?2)) = ?2
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![self.name, prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn clear(&self) -> StorageResult<()> {
        self.conn()
            .execute("DELETE FROM kv_records WHERE store = ?1", params![self.name])?;
        Ok(())
    }

    fn size_bytes(&self) -> StorageResult<u64> {
        let total: i64 = self.conn().query_row(
            "SELECT COALESCE(SUM(length(key) + length(value)), 0) FROM kv_records WHERE store = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}
