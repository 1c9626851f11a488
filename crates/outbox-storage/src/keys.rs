//! Storage key constants.

/// Storage keys used by the outbox
pub struct StorageKeys;

impl StorageKeys {
    /// Serialized submission queue (versioned JSON document)
    pub const SUBMISSION_QUEUE: &'static str = "submission_queue";

    /// Last unreadable copy of the submission queue, kept for manual inspection
    pub const SUBMISSION_QUEUE_CORRUPT: &'static str = "submission_queue.corrupt";
}
