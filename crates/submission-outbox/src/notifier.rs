//! Stats notifications.
//!
//! Listeners receive the full [`QueueStats`] snapshot after every store
//! mutation, synchronously on the mutating thread.
//!
//! # Delivery rules
//!
//! - Snapshots carry a sequence number taken under the store lock; a snapshot
//!   older than one already delivered is dropped, so listeners never see
//!   counts go backwards.
//! - Callbacks run outside the store lock and may read the queue. A callback
//!   that mutates the queue gets the resulting snapshot delivered re-entrantly,
//!   and listeners not yet reached skip the older one.
//! - Dropping or revoking a [`Subscription`] stops delivery to that listener
//!   only.

use crate::stats::QueueStats;
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener = Arc<dyn Fn(&QueueStats) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: RwLock<HashMap<u64, Listener>>,
}

/// Publishes stats snapshots to registered listeners.
pub struct StatsNotifier {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    /// Sequence number of the last delivered snapshot.
    delivered: ReentrantMutex<Cell<u64>>,
}

impl StatsNotifier {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
            delivered: ReentrantMutex::new(Cell::new(0)),
        }
    }

    /// Register a listener. Delivery stops when the returned handle is
    /// revoked or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&QueueStats) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners.write().insert(id, Arc::new(listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of active listeners.
    pub fn subscriber_count(&self) -> usize {
        self.registry.listeners.read().len()
    }

    /// Deliver a snapshot produced at `sequence`.
    pub(crate) fn publish(&self, sequence: u64, stats: &QueueStats) {
        let delivered = self.delivered.lock();
        if sequence <= delivered.get() {
            return;
        }
        delivered.set(sequence);

        // Listeners may subscribe or revoke from inside the callback.
        let listeners: Vec<Listener> = self.registry.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(stats);
            // A listener mutated the queue and a newer snapshot went out.
            if delivered.get() > sequence {
                break;
            }
        }
    }
}

impl Default for StatsNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatsNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Revocation handle for a stats listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Stop delivery to this listener.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.listeners.write().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
