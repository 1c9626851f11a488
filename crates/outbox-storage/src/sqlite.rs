//! SQLite-backed durable storage.
//!
//! A single `kv` table holds every value. Writes use `synchronous = FULL` so
//! a successful `set` has reached disk before the caller is told so.
//! A file-backed database is owned by one handle at a time, through an OS
//! lock on `<database>.lock`.

use crate::lock::OwnerLock;
use crate::{DurableStorage, StorageResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

/// SQLite key/value store.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    _owner: Option<OwnerLock>,
}

impl SqliteStorage {
    /// Open (or create) a database at the given path.
    ///
    /// Fails with [`StorageError::Locked`](crate::StorageError::Locked) while
    /// another handle, in this process or another, has the same file open.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let owner = OwnerLock::acquire(path)?;
        let conn = Connection::open(path)?;
        let mut storage = Self::from_connection(conn)?;
        storage._owner = Some(owner);
        info!(path = %path.display(), "sqlite storage opened");
        Ok(storage)
    }

    /// Creates an in-memory database.
    ///
    /// Useful for testing.
    pub fn in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            _owner: None,
        })
    }

    /// Returns the current Unix timestamp in milliseconds.
    fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

impl DurableStorage for SqliteStorage {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Self::now_millis()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }
}
