//! Durable queue store.
//!
//! The store is the only owner of submission items. Every mutation runs under
//! one lock: it applies the change to a copy of the item list, writes the
//! whole list to durable storage, then commits. Stats are computed under the
//! same lock and published after it is released.
//!
//! # Persistence
//!
//! Items live under [`StorageKeys::SUBMISSION_QUEUE`] as a versioned JSON
//! document. On open:
//!
//! - InFlight items are reset to Pending (the send was interrupted)
//! - unparseable data is copied to [`StorageKeys::SUBMISSION_QUEUE_CORRUPT`]
//!   and the store starts empty
//! - a storage read error starts the store empty, degraded, with writes
//!   suspended so the unread data is never overwritten
//!
//! # Degraded mode
//!
//! When a write fails the change is kept in memory and the store is marked
//! degraded for the rest of the session. Later mutations still try to write
//! the full list. Only `enqueue` reports the failure to its caller; `purge`
//! is rolled back instead.

use crate::clock::{add_duration, to_chrono, Clock};
use crate::error::{QueueError, QueueResult};
use crate::item::{Payload, SubmissionId, SubmissionItem, SubmissionState};
use crate::notifier::{StatsNotifier, Subscription};
use crate::retry::{ErrorClass, RetryDecision, RetryPolicy};
use crate::stats::QueueStats;
use crate::transport::SendOutcome;
use chrono::{DateTime, Utc};
use outbox_storage::{DurableStorage, StorageError, StorageKeys};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Current persisted document version.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct PersistedQueueRef<'a> {
    version: u32,
    items: &'a [SubmissionItem],
}

#[derive(Deserialize)]
struct PersistedQueue {
    version: u32,
    items: Vec<SubmissionItem>,
}

/// Field changes applied together with a state change.
#[derive(Clone, Debug, Default)]
pub struct ItemUpdate {
    pub attempts: Option<u32>,
    /// `Some(None)` clears the error.
    pub last_error: Option<Option<String>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_eligible_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct StoreState {
    items: Vec<SubmissionItem>,
    degraded: bool,
    writes_suspended: bool,
    /// Bumped on every committed mutation.
    sequence: u64,
}

impl StoreState {
    fn stats(&self) -> QueueStats {
        QueueStats::from_items(&self.items, self.degraded)
    }
}

/// Durable, ordered collection of submission items.
pub struct QueueStore {
    storage: Arc<dyn DurableStorage>,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
    notifier: StatsNotifier,
}

impl QueueStore {
    /// Load the queue from storage.
    ///
    /// Never fails: unreadable or corrupt data is logged and the store starts
    /// empty.
    pub fn open(storage: Arc<dyn DurableStorage>, clock: Arc<dyn Clock>) -> Self {
        let mut state = StoreState::default();

        match storage.get(StorageKeys::SUBMISSION_QUEUE) {
            Ok(None) => {
                debug!("no persisted submission queue");
            }
            Ok(Some(raw)) => match serde_json::from_slice::<PersistedQueue>(&raw) {
                Ok(persisted) if persisted.version == FORMAT_VERSION => {
                    state.items = persisted.items;
                }
                Ok(persisted) => {
                    warn!(version = persisted.version, "unsupported submission queue version");
                    quarantine(storage.as_ref(), &raw, &mut state);
                }
                Err(e) => {
                    error!(error = %e, bytes = raw.len(), "submission queue is corrupt, starting empty");
                    quarantine(storage.as_ref(), &raw, &mut state);
                }
            },
            Err(e) => {
                error!(error = %e, "failed to read submission queue, starting empty with writes suspended");
                state.degraded = true;
                state.writes_suspended = true;
            }
        }

        let mut recovered = 0usize;
        for item in state.items.iter_mut() {
            if item.state == SubmissionState::InFlight {
                item.state = SubmissionState::Pending;
                recovered += 1;
            }
        }

        let store = Self {
            storage,
            clock,
            state: Mutex::new(state),
            notifier: StatsNotifier::new(),
        };

        {
            let mut state = store.state.lock();
            if recovered > 0 {
                info!(count = recovered, "recovered interrupted submissions to pending");
                let items = state.items.clone();
                if let Err(e) = store.commit(&mut state, items) {
                    warn!(error = %e, "failed to persist recovered submissions");
                }
            }
            info!(items = state.items.len(), degraded = state.degraded, "submission queue loaded");
        }

        store
    }

    /// Add a Pending item and persist it.
    ///
    /// On a storage failure the item is still accepted in memory and the
    /// error carries its id.
    pub fn enqueue(&self, kind: &str, payload: impl Into<Payload>) -> QueueResult<SubmissionId> {
        let mut item = SubmissionItem::new(kind, payload, self.clock.now());

        let (result, snapshot) = {
            let mut state = self.state.lock();
            while state.items.iter().any(|existing| existing.id == item.id) {
                item.id = SubmissionId::new();
            }
            let id = item.id.clone();

            let mut items = state.items.clone();
            items.push(item);
            let result = self.commit(&mut state, items).map_err(|source| {
                warn!(item_id = %id, error = %source, "enqueue not durable, kept in memory");
                QueueError::Storage {
                    id: Some(id.clone()),
                    source,
                }
            });
            (result.map(|()| id), (state.sequence, state.stats()))
        };

        self.publish(snapshot);
        if let Ok(id) = &result {
            debug!(item_id = %id, kind, "enqueued submission");
        }
        result
    }

    /// Items in insertion order, optionally filtered by state.
    pub fn list(&self, filter: Option<SubmissionState>) -> Vec<SubmissionItem> {
        let state = self.state.lock();
        state
            .items
            .iter()
            .filter(|item| filter.map_or(true, |wanted| item.state == wanted))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &SubmissionId) -> Option<SubmissionItem> {
        let state = self.state.lock();
        state.items.iter().find(|item| &item.id == id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        self.state.lock().stats()
    }

    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a stats listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&QueueStats) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn notifier(&self) -> &StatsNotifier {
        &self.notifier
    }

    /// Atomically change an item's state along an allowed transition.
    ///
    /// Items only enter InFlight through [`claim_eligible`](Self::claim_eligible),
    /// which enforces the in-flight bound.
    pub fn update_state(
        &self,
        id: &SubmissionId,
        new_state: SubmissionState,
        update: ItemUpdate,
    ) -> QueueResult<SubmissionItem> {
        self.mutate(|items| {
            let item = find_mut(items, id)?;
            if !item.state.can_transition_to(new_state) {
                return Err(QueueError::InvalidTransition {
                    id: id.clone(),
                    from: item.state,
                    to: new_state,
                });
            }
            if new_state == SubmissionState::InFlight {
                return Err(QueueError::InvalidUpdate {
                    id: id.clone(),
                    reason: "items are moved InFlight only by claim_eligible".into(),
                });
            }
            if let Some(attempts) = update.attempts {
                if attempts < item.attempts {
                    return Err(QueueError::InvalidUpdate {
                        id: id.clone(),
                        reason: format!("attempts cannot decrease ({} -> {attempts})", item.attempts),
                    });
                }
                item.attempts = attempts;
            }
            if let Some(last_error) = update.last_error {
                item.last_error = last_error;
            }
            if let Some(at) = update.last_attempt_at {
                item.last_attempt_at = Some(at);
            }
            if let Some(at) = update.next_eligible_at {
                item.next_eligible_at = at;
            }
            item.state = new_state;
            Ok(item.clone())
        })
    }

    /// Claim eligible Pending items in insertion order.
    ///
    /// Claims at most `max_in_flight` minus the items already InFlight, so
    /// concurrent callers can never exceed the bound between them.
    pub fn claim_eligible(&self, now: DateTime<Utc>, max_in_flight: usize) -> Vec<SubmissionItem> {
        let (claimed, snapshot) = {
            let mut state = self.state.lock();
            let in_flight = state
                .items
                .iter()
                .filter(|item| item.state == SubmissionState::InFlight)
                .count();
            let available = max_in_flight.saturating_sub(in_flight);
            if available == 0 || !state.items.iter().any(|item| item.is_eligible(now)) {
                return Vec::new();
            }

            let mut items = state.items.clone();
            let claimed: Vec<SubmissionItem> = items
                .iter_mut()
                .filter(|item| item.is_eligible(now))
                .take(available)
                .map(|item| {
                    item.state = SubmissionState::InFlight;
                    item.last_attempt_at = Some(now);
                    item.clone()
                })
                .collect();

            if let Err(e) = self.commit(&mut state, items) {
                warn!(error = %e, count = claimed.len(), "claim kept in memory only");
            }
            (claimed, (state.sequence, state.stats()))
        };

        self.publish(snapshot);
        claimed
    }

    /// Earliest time after `now` at which a backed-off Pending item becomes
    /// eligible.
    pub fn next_eligible_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let state = self.state.lock();
        state
            .items
            .iter()
            .filter(|item| item.state == SubmissionState::Pending && item.next_eligible_at > now)
            .map(|item| item.next_eligible_at)
            .min()
    }

    /// Write the result of a send attempt back to an InFlight item.
    ///
    /// Returns the item's new state.
    pub fn record_outcome(
        &self,
        id: &SubmissionId,
        outcome: &SendOutcome,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> QueueResult<SubmissionState> {
        self.mutate(|items| {
            let item = find_mut(items, id)?;
            if item.state != SubmissionState::InFlight {
                return Err(QueueError::InvalidUpdate {
                    id: id.clone(),
                    reason: format!("send outcome recorded for a {} submission", item.state),
                });
            }

            let prior_attempts = item.attempts;
            item.attempts = prior_attempts.saturating_add(1);
            item.last_attempt_at = Some(now);

            let (class, reason) = match outcome {
                SendOutcome::Success => {
                    item.state = SubmissionState::Succeeded;
                    item.last_error = None;
                    return Ok(item.state);
                }
                SendOutcome::TransientError(reason) => (ErrorClass::Transient, reason),
                SendOutcome::PermanentError(reason) => (ErrorClass::Permanent, reason),
            };

            match policy.decide(prior_attempts, class, reason) {
                RetryDecision::RetryAfter(delay) => {
                    item.state = SubmissionState::Pending;
                    item.next_eligible_at = add_duration(now, delay);
                    item.last_error = Some(reason.clone());
                }
                RetryDecision::GiveUp(failure) => {
                    item.state = SubmissionState::Failed;
                    item.last_error = Some(failure.to_string());
                }
            }
            Ok(item.state)
        })
    }

    /// Manually send a Failed item back to Pending with a fresh attempt budget.
    pub fn retry(&self, id: &SubmissionId) -> QueueResult<()> {
        let now = self.clock.now();
        self.mutate(|items| {
            let item = find_mut(items, id)?;
            if item.state != SubmissionState::Failed {
                return Err(QueueError::NotFailed {
                    id: id.clone(),
                    state: item.state,
                });
            }
            item.state = SubmissionState::Pending;
            item.attempts = 0;
            item.last_error = None;
            item.next_eligible_at = now;
            Ok(())
        })?;
        info!(item_id = %id, "failed submission reset for retry");
        Ok(())
    }

    /// Remove terminal items settled more than `older_than` before `now`.
    ///
    /// Unlike other mutations, a failed write leaves the items in place.
    pub fn purge_terminal(&self, older_than: Duration, now: DateTime<Utc>) -> QueueResult<usize> {
        let Some(cutoff) = now.checked_sub_signed(to_chrono(older_than)) else {
            return Ok(0);
        };

        let (purged, snapshot) = {
            let mut state = self.state.lock();
            let before = state.items.len();
            let items: Vec<SubmissionItem> = state
                .items
                .iter()
                .filter(|item| !(item.state.is_terminal() && item.settled_at() < cutoff))
                .cloned()
                .collect();
            let purged = before - items.len();
            if purged == 0 {
                return Ok(0);
            }

            self.persist(&state, &items)
                .map_err(|source| QueueError::Storage { id: None, source })?;
            state.items = items;
            state.sequence += 1;
            (purged, (state.sequence, state.stats()))
        };

        self.publish(snapshot);
        info!(count = purged, "purged terminal submissions");
        Ok(purged)
    }

    /// Apply a mutation to a copy of the items, then commit it.
    ///
    /// A write failure keeps the change in memory and marks the store degraded.
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<SubmissionItem>) -> QueueResult<T>) -> QueueResult<T> {
        let (value, snapshot) = {
            let mut state = self.state.lock();
            let mut items = state.items.clone();
            let value = f(&mut items)?;
            if let Err(e) = self.commit(&mut state, items) {
                warn!(error = %e, "queue change kept in memory only");
            }
            (value, (state.sequence, state.stats()))
        };

        self.publish(snapshot);
        Ok(value)
    }

    /// Persist `items`, then make them the current state.
    ///
    /// The items are committed in memory even if the write fails.
    fn commit(&self, state: &mut StoreState, items: Vec<SubmissionItem>) -> Result<(), StorageError> {
        let result = self.persist(state, &items);
        if result.is_err() && !state.degraded {
            error!("durable storage failed, queue is now degraded");
            state.degraded = true;
        }
        state.items = items;
        state.sequence += 1;
        result
    }

    fn persist(&self, state: &StoreState, items: &[SubmissionItem]) -> Result<(), StorageError> {
        if state.writes_suspended {
            return Err(StorageError::Unavailable(
                "writes suspended after failed load".to_string(),
            ));
        }
        let document = PersistedQueueRef {
            version: FORMAT_VERSION,
            items,
        };
        let bytes = serde_json::to_vec(&document)
            .map_err(|e| StorageError::Unavailable(format!("failed to encode queue: {e}")))?;
        self.storage.set(StorageKeys::SUBMISSION_QUEUE, &bytes)
    }

    fn publish(&self, (sequence, stats): (u64, QueueStats)) {
        self.notifier.publish(sequence, &stats);
    }
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore").field("stats", &self.stats()).finish()
    }
}

fn find_mut<'a>(items: &'a mut [SubmissionItem], id: &SubmissionId) -> QueueResult<&'a mut SubmissionItem> {
    items
        .iter_mut()
        .find(|item| &item.id == id)
        .ok_or_else(|| QueueError::NotFound(id.clone()))
}

/// Keep an unreadable queue document aside before it can be overwritten.
fn quarantine(storage: &dyn DurableStorage, raw: &[u8], state: &mut StoreState) {
    match storage.set(StorageKeys::SUBMISSION_QUEUE_CORRUPT, raw) {
        Ok(()) => {
            warn!(key = StorageKeys::SUBMISSION_QUEUE_CORRUPT, "unreadable queue copied aside");
        }
        Err(e) => {
            error!(error = %e, "could not copy unreadable queue aside, suspending writes");
            state.degraded = true;
            state.writes_suspended = true;
        }
    }
}
