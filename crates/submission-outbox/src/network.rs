//! Connectivity reporting.

use tokio::sync::watch;

/// Reports whether the collection service is reachable.
///
/// Subscribers get a `watch` receiver; dropping it unsubscribes.
pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Monitor whose state is set by the caller.
#[derive(Debug)]
pub struct ManualNetworkMonitor {
    state: watch::Sender<bool>,
}

impl ManualNetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    /// Update connectivity. Subscribers are only notified on a change.
    pub fn set_online(&self, online: bool) {
        self.state.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl Default for ManualNetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkMonitor for ManualNetworkMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
