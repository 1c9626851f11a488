//! Dispatcher: drives eligible submissions through the transport.
//!
//! ## Control loop
//!
//! ```text
//!  enqueue ───────┐
//!  connectivity ──┼──▶ wake channel (capacity 1) ──┐
//!  manual ────────┘                                 │
//!  poll ticker ─────────────────────────────────────┼──▶ claim ──▶ send ──▶ record outcome
//!  backoff deadline ────────────────────────────────┤
//!  attempt finished ────────────────────────────────┘
//! ```
//!
//! One task owns the loop, so cycles never overlap. A wake that arrives while
//! the channel already holds one is dropped: the queued wake covers it.
//! Claims go through [`QueueStore::claim_eligible`], which enforces the
//! in-flight bound across every caller, including [`Dispatcher::run_cycle`].
//!
//! Attempts are polled in claim order, so the first attempts of items that
//! became eligible together start in enqueue order.

use crate::clock::Clock;
use crate::error::{QueueError, QueueResult};
use crate::item::{SubmissionItem, SubmissionState};
use crate::network::NetworkMonitor;
use crate::retry::RetryPolicy;
use crate::store::QueueStore;
use crate::transport::{SendOutcome, SendRequest, SubmissionTransport};
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Pending wakes beyond this are coalesced.
const WAKE_CHANNEL_CAPACITY: usize = 1;

/// Why the dispatcher ran a cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeReason {
    /// A submission was enqueued.
    Enqueued,
    /// The network monitor reported connectivity.
    ConnectivityRestored,
    /// Fallback poll interval or a backoff deadline elapsed.
    Timer,
    /// An attempt finished and freed a slot.
    AttemptFinished,
    /// Requested by the application.
    Manual,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Maximum submissions InFlight at once.
    pub max_in_flight: usize,
    /// Upper bound on a single send attempt.
    pub send_timeout: Duration,
    /// Cycle interval when nothing else wakes the dispatcher.
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 3,
            send_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
        }
    }
}

impl DispatcherConfig {
    /// Reject settings that would stall or crash the control loop.
    pub fn validate(&self) -> QueueResult<()> {
        if self.max_in_flight == 0 {
            return Err(QueueError::InvalidConfig("max_in_flight must be at least 1".into()));
        }
        if self.send_timeout.is_zero() {
            return Err(QueueError::InvalidConfig("send_timeout must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig("poll_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Cloneable handle for waking the dispatcher.
#[derive(Clone, Debug)]
pub struct DispatchWaker {
    sender: mpsc::Sender<WakeReason>,
}

impl DispatchWaker {
    /// Request a dispatch cycle. Never blocks.
    pub fn wake(&self, reason: WakeReason) {
        match self.sender.try_send(reason) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(reason = ?reason, "wake coalesced with pending wake");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(reason = ?reason, "wake ignored, dispatcher stopped");
            }
        }
    }
}

struct Shared {
    store: Arc<QueueStore>,
    transport: Arc<dyn SubmissionTransport>,
    network: Arc<dyn NetworkMonitor>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    config: DispatcherConfig,
}

impl Shared {
    /// Claim whatever the in-flight bound allows, if online.
    fn claim(&self) -> Vec<SubmissionItem> {
        if !self.network.is_online() {
            debug!("offline, skipping dispatch cycle");
            return Vec::new();
        }
        self.store
            .claim_eligible(self.clock.now(), self.config.max_in_flight)
    }

    /// Time until the next backed-off item becomes eligible, if one is waiting.
    fn until_next_eligible(&self) -> Option<Duration> {
        let now = self.clock.now();
        let next = self.store.next_eligible_after(now)?;
        (next - now).to_std().ok()
    }
}

/// Claims eligible submissions and sends them, at most `max_in_flight` at a time.
pub struct Dispatcher {
    shared: Arc<Shared>,
    waker: DispatchWaker,
    receiver: Mutex<Option<mpsc::Receiver<WakeReason>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<QueueStore>,
        transport: Arc<dyn SubmissionTransport>,
        network: Arc<dyn NetworkMonitor>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        config: DispatcherConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(WAKE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                store,
                transport,
                network,
                clock,
                policy,
                config,
            }),
            waker: DispatchWaker { sender },
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn waker(&self) -> DispatchWaker {
        self.waker.clone()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Run one dispatch cycle and wait for all of its attempts.
    ///
    /// Returns the number of submissions attempted.
    pub async fn run_cycle(&self) -> usize {
        let claimed = self.shared.claim();
        let count = claimed.len();
        if count > 0 {
            debug!(count, "dispatch cycle claimed submissions");
        }

        let mut attempts: FuturesUnordered<_> = claimed
            .into_iter()
            .map(|item| attempt(self.shared.clone(), item))
            .collect();
        while attempts.next().await.is_some() {}

        count
    }

    /// Spawn the background control loop.
    ///
    /// Can only be called once per dispatcher. Fails without consuming that
    /// one start if the config is invalid.
    pub fn start(&self) -> QueueResult<DispatcherHandle> {
        self.shared.config.validate()?;
        let receiver = self.receiver.lock().take().ok_or(QueueError::AlreadyStarted)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let forwarder = tokio::spawn(forward_connectivity(
            self.shared.network.subscribe(),
            self.waker.clone(),
        ));
        let task = tokio::spawn(run_loop(self.shared.clone(), receiver, shutdown_rx));

        info!(
            max_in_flight = self.shared.config.max_in_flight,
            send_timeout_ms = self.shared.config.send_timeout.as_millis() as u64,
            poll_interval_ms = self.shared.config.poll_interval.as_millis() as u64,
            "dispatcher started"
        );

        Ok(DispatcherHandle {
            shutdown: shutdown_tx,
            task,
            forwarder,
        })
    }
}

/// Handle to a running dispatcher loop.
///
/// Dropping the handle also stops the loop.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop scheduling cycles and wait for in-flight attempts to finish or
    /// time out.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.forwarder.abort();
        if let Err(e) = self.task.await {
            error!(error = %e, "dispatcher task ended abnormally");
        }
        info!("dispatcher stopped");
    }
}

/// Turn connectivity changes into wake messages.
async fn forward_connectivity(mut online: watch::Receiver<bool>, waker: DispatchWaker) {
    while online.changed().await.is_ok() {
        let is_online = *online.borrow_and_update();
        if is_online {
            info!("connectivity restored");
            waker.wake(WakeReason::ConnectivityRestored);
        } else {
            info!("connectivity lost");
        }
    }
    debug!("network monitor closed");
}

async fn run_loop(
    shared: Arc<Shared>,
    mut wake_rx: mpsc::Receiver<WakeReason>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut in_flight = FuturesUnordered::new();
    let mut ticker = interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let backoff = if in_flight.len() < shared.config.max_in_flight {
            shared.until_next_eligible()
        } else {
            None
        };

        let reason = tokio::select! {
            _ = shutdown_rx.changed() => break,
            Some(()) = in_flight.next(), if !in_flight.is_empty() => WakeReason::AttemptFinished,
            wake = wake_rx.recv() => match wake {
                Some(reason) => {
                    while wake_rx.try_recv().is_ok() {}
                    reason
                }
                None => break,
            },
            _ = ticker.tick() => WakeReason::Timer,
            _ = tokio::time::sleep(backoff.unwrap_or_default()), if backoff.is_some() => WakeReason::Timer,
        };

        let claimed = shared.claim();
        if !claimed.is_empty() {
            debug!(reason = ?reason, count = claimed.len(), in_flight = in_flight.len(), "dispatch cycle");
        }
        for item in claimed {
            in_flight.push(attempt(shared.clone(), item));
        }
    }

    if !in_flight.is_empty() {
        info!(count = in_flight.len(), "waiting for in-flight submissions");
    }
    while in_flight.next().await.is_some() {}
}

/// Send one claimed item and write the outcome back to the store.
async fn attempt(shared: Arc<Shared>, item: SubmissionItem) {
    let timeout = shared.config.send_timeout;
    let request = SendRequest {
        id: &item.id,
        kind: &item.kind,
        payload: item.payload.as_bytes(),
    };

    let outcome = match tokio::time::timeout(timeout, shared.transport.send(request, timeout)).await {
        Ok(outcome) => outcome,
        Err(_) => SendOutcome::TransientError(format!("timed out after {}ms", timeout.as_millis())),
    };

    let attempt_number = item.attempts.saturating_add(1);
    let now = shared.clock.now();
    match shared.store.record_outcome(&item.id, &outcome, &shared.policy, now) {
        Ok(SubmissionState::Succeeded) => {
            info!(item_id = %item.id, kind = %item.kind, attempt = attempt_number, "submission delivered");
        }
        Ok(SubmissionState::Failed) => {
            warn!(
                item_id = %item.id,
                kind = %item.kind,
                attempt = attempt_number,
                outcome = ?outcome,
                "submission failed"
            );
        }
        Ok(state) => {
            debug!(
                item_id = %item.id,
                attempt = attempt_number,
                state = %state,
                outcome = ?outcome,
                "submission will be retried"
            );
        }
        Err(e) => {
            error!(item_id = %item.id, error = %e, "failed to record send outcome");
        }
    }
}
