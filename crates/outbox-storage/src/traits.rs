//! Storage trait definitions.

use crate::StorageResult;

/// Opaque byte storage that survives process restarts.
///
/// Implementations must make `set` durable before returning `Ok`; the outbox
/// relies on that to report enqueue success.
pub trait DurableStorage: Send + Sync {
    /// Store a value, replacing any previous value under the key.
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Retrieve a value, or `None` if the key is absent.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a value. Returns whether a value was present.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
