//! Submission transport contract.

use crate::item::SubmissionId;
use crate::retry::ErrorClass;
use async_trait::async_trait;
use std::time::Duration;

/// One send attempt, borrowed from the claimed item.
#[derive(Clone, Copy, Debug)]
pub struct SendRequest<'a> {
    /// Stable across attempts; suitable as an idempotency key.
    pub id: &'a SubmissionId,
    pub kind: &'a str,
    pub payload: &'a [u8],
}

/// Result of a single send attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Success,
    /// Timeout, network failure or server-side error.
    TransientError(String),
    /// The payload was rejected.
    PermanentError(String),
}

impl SendOutcome {
    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            SendOutcome::Success => None,
            SendOutcome::TransientError(_) => Some(ErrorClass::Transient),
            SendOutcome::PermanentError(_) => Some(ErrorClass::Permanent),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success)
    }
}

/// Delivers submissions to the collection service.
///
/// Implementations classify failures themselves. The dispatcher also enforces
/// `timeout` and treats expiry as a transient error.
#[async_trait]
pub trait SubmissionTransport: Send + Sync {
    async fn send(&self, request: SendRequest<'_>, timeout: Duration) -> SendOutcome;
}
