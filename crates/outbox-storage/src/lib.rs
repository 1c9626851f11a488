//! Durable key/value storage for the field outbox.
//!
//! This crate provides:
//! - [`DurableStorage`]: the byte-blob contract the queue persists through
//! - [`SqliteStorage`]: SQLite-backed implementation used on device
//! - [`MemoryStorage`]: in-process implementation with failure injection,
//!   used by tests and for best-effort embedding

mod keys;
mod lock;
mod memory;
mod sqlite;
mod traits;

pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::DurableStorage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The backend refused the operation or is not reachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Another handle owns the database.
    #[error(
        "{} is in use by another process{}",
        .path.display(),
        .holder.map(|pid| format!(" (pid {pid})")).unwrap_or_default()
    )]
    Locked {
        path: std::path::PathBuf,
        holder: Option<u32>,
    },

    #[error("storage directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
