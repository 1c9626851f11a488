//! Application-facing outbox API.

use crate::dispatcher::{DispatchWaker, WakeReason};
use crate::error::{QueueError, QueueResult};
use crate::item::{Payload, SubmissionId, SubmissionItem, SubmissionState};
use crate::notifier::Subscription;
use crate::stats::QueueStats;
use crate::store::QueueStore;
use std::sync::Arc;
use std::time::Duration;

/// Entry point for producers and inspection screens.
///
/// Wraps a [`QueueStore`] and, when a dispatcher is attached, wakes it after
/// every change that can make work available.
#[derive(Clone)]
pub struct SubmissionOutbox {
    store: Arc<QueueStore>,
    waker: Option<DispatchWaker>,
}

impl SubmissionOutbox {
    pub fn new(store: Arc<QueueStore>) -> Self {
        Self { store, waker: None }
    }

    /// Wake this dispatcher on enqueue and retry.
    pub fn with_waker(mut self, waker: DispatchWaker) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Queue a record for delivery.
    ///
    /// Returns once the record is durably stored. Never waits on the network.
    /// A [`QueueError::Storage`] error means the record is held in memory only.
    pub fn enqueue(&self, kind: &str, payload: impl Into<Payload>) -> QueueResult<SubmissionId> {
        let result = self.store.enqueue(kind, payload);
        // An in-memory item is still deliverable this session.
        if matches!(&result, Ok(_) | Err(QueueError::Storage { id: Some(_), .. })) {
            self.wake(WakeReason::Enqueued);
        }
        result
    }

    pub fn stats(&self) -> QueueStats {
        self.store.stats()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&QueueStats) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    /// Terminally failed submissions, oldest first.
    pub fn list_failed(&self) -> Vec<SubmissionItem> {
        self.store.list(Some(SubmissionState::Failed))
    }

    /// Reset a Failed submission to Pending with a fresh attempt budget.
    pub fn retry(&self, id: &SubmissionId) -> QueueResult<()> {
        self.store.retry(id)?;
        self.wake(WakeReason::Manual);
        Ok(())
    }

    pub fn list(&self, filter: Option<SubmissionState>) -> Vec<SubmissionItem> {
        self.store.list(filter)
    }

    pub fn get(&self, id: &SubmissionId) -> Option<SubmissionItem> {
        self.store.get(id)
    }

    /// Remove Succeeded and Failed submissions settled longer ago than `older_than`.
    pub fn purge_terminal(&self, older_than: Duration) -> QueueResult<usize> {
        self.store.purge_terminal(older_than, self.store.now())
    }

    pub fn is_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    fn wake(&self, reason: WakeReason) {
        if let Some(waker) = &self.waker {
            waker.wake(reason);
        }
    }
}

impl std::fmt::Debug for SubmissionOutbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionOutbox")
            .field("stats", &self.stats())
            .field("dispatcher_attached", &self.waker.is_some())
            .finish()
    }
}
