//! Outbox error types.

use crate::item::{SubmissionId, SubmissionState};
use outbox_storage::StorageError;
use thiserror::Error;

/// Outbox error type.
///
/// Send failures never appear here. They are recorded on the item and
/// surfaced through stats, `list_failed` and notifications.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Durable persistence could not complete.
    ///
    /// When `id` is set the item was accepted into memory and will still be
    /// delivered best effort, but it will not survive a restart.
    #[error("Durable storage unavailable: {source}")]
    Storage {
        id: Option<SubmissionId>,
        #[source]
        source: StorageError,
    },

    /// No item with this id
    #[error("Submission not found: {0}")]
    NotFound(SubmissionId),

    /// Manual retry requested for an item that is not Failed
    #[error("Submission {id} is {state}, only failed submissions can be retried")]
    NotFailed {
        id: SubmissionId,
        state: SubmissionState,
    },

    /// State change outside the item lifecycle
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: SubmissionId,
        from: SubmissionState,
        to: SubmissionState,
    },

    /// Field update that would break an item invariant
    #[error("Invalid update for {id}: {reason}")]
    InvalidUpdate { id: SubmissionId, reason: String },

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Settings the dispatcher cannot run with
    #[error("Invalid dispatcher config: {0}")]
    InvalidConfig(String),

    /// Dispatcher loop was started twice
    #[error("Dispatcher already started")]
    AlreadyStarted,
}

/// Result type alias using QueueError.
pub type QueueResult<T> = Result<T, QueueError>;
