//! Cross-process ownership of a database file.
//!
//! The queue is loaded into memory by whoever opens it, so only one process
//! may hold it at a time. Ownership is an advisory OS lock on a sibling
//! `<database>.lock` file. The lock is released when the handle is dropped
//! or the process exits; the file itself is left in place.

use crate::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A held exclusive lock on a database file.
#[derive(Debug)]
pub(crate) struct OwnerLock {
    file: File,
    path: PathBuf,
}

impl OwnerLock {
    /// Take the lock for `database`, failing at once if another handle has it.
    pub(crate) fn acquire(database: &Path) -> StorageResult<Self> {
        let path = lock_path_for(database);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: database.to_path_buf(),
                holder: read_holder(&mut file),
            });
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        debug!(path = %path.display(), "database ownership acquired");
        Ok(Self { file, path })
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "database ownership released");
    }
}

/// `<database>.lock`, next to the database.
pub(crate) fn lock_path_for(database: &Path) -> PathBuf {
    let mut path = database.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

/// Pid recorded by the current owner, if readable.
fn read_holder(file: &mut File) -> Option<u32> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}
