//! Integration tests for the submission outbox.
//!
//! - `scenarios.rs`   - End-to-end delivery scenarios (offline enqueue, retry exhaustion, FIFO, manual retry)
//! - `properties.rs`  - Liveness, termination, stats consistency
//! - `ordering.rs`    - Attempt ordering and skipping of backed-off items
//! - `concurrency.rs` - In-flight bound and exclusive claims
//! - `recovery.rs`    - Restart behavior on SQLite storage
//! - `live.rs`        - Background dispatcher loop: wakes, timeouts, shutdown

mod live;
mod scenarios;

use crate::{
    Dispatcher, DispatcherConfig, ManualClock, ManualNetworkMonitor, QueueStore, RetryPolicy,
    SendOutcome, SendRequest, SubmissionId, SubmissionOutbox, SubmissionTransport,
};
use async_trait::async_trait;
use outbox_storage::{DurableStorage, MemoryStorage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One call observed by [`ScriptedTransport`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SentRecord {
    pub id: SubmissionId,
    pub kind: String,
    pub payload: Vec<u8>,
}

/// Transport that records every call and replies from a script.
///
/// Once the script is empty every call gets the fallback outcome.
pub(crate) struct ScriptedTransport {
    calls: Mutex<Vec<SentRecord>>,
    script: Mutex<VecDeque<SendOutcome>>,
    fallback: SendOutcome,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedTransport {
    pub fn succeeding() -> Self {
        Self::with_fallback(SendOutcome::Success)
    }

    pub fn with_fallback(fallback: SendOutcome) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Hold every call for `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = SendOutcome>) {
        self.script.lock().extend(outcomes);
    }

    pub fn calls(&self) -> Vec<SentRecord> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn sent_payloads(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|call| String::from_utf8_lossy(&call.payload).into_owned())
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionTransport for ScriptedTransport {
    async fn send(&self, request: SendRequest<'_>, _timeout: Duration) -> SendOutcome {
        self.calls.lock().push(SentRecord {
            id: request.id.clone(),
            kind: request.kind.to_string(),
            payload: request.payload.to_vec(),
        });

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Retry policy without jitter, for exact schedule assertions.
pub(crate) fn exact_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_secs(2),
        cap: Duration::from_secs(60),
        jitter_max: Duration::ZERO,
        max_attempts,
    }
}

/// Retry policy with no delay between attempts.
pub(crate) fn immediate_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        base: Duration::ZERO,
        cap: Duration::ZERO,
        jitter_max: Duration::ZERO,
        max_attempts,
    }
}

/// A fully wired outbox over in-memory storage and a manual clock.
pub(crate) struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub network: Arc<ManualNetworkMonitor>,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<QueueStore>,
    pub dispatcher: Dispatcher,
    pub outbox: SubmissionOutbox,
}

impl Harness {
    pub fn new(transport: ScriptedTransport, policy: RetryPolicy, max_in_flight: usize) -> Self {
        Self::with_config(
            transport,
            policy,
            DispatcherConfig {
                max_in_flight,
                send_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_secs(3600),
            },
        )
    }

    pub fn with_config(transport: ScriptedTransport, policy: RetryPolicy, config: DispatcherConfig) -> Self {
        Self::over_storage(Arc::new(MemoryStorage::new()), transport, policy, config)
    }

    pub fn over_storage(
        storage: Arc<MemoryStorage>,
        transport: ScriptedTransport,
        policy: RetryPolicy,
        config: DispatcherConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::default());
        let network = Arc::new(ManualNetworkMonitor::new(true));
        let transport = Arc::new(transport);
        let store = Arc::new(QueueStore::open(
            storage.clone() as Arc<dyn DurableStorage>,
            clock.clone(),
        ));
        let dispatcher = Dispatcher::new(
            store.clone(),
            transport.clone(),
            network.clone(),
            clock.clone(),
            policy,
            config,
        );
        let outbox = SubmissionOutbox::new(store.clone()).with_waker(dispatcher.waker());

        Self {
            storage,
            clock,
            network,
            transport,
            store,
            dispatcher,
            outbox,
        }
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Basic workflow: enqueue, dispatch, observe.
#[tokio::test]
async fn basic_workflow() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 3);

    let id = h.outbox.enqueue("match-record", r#"{"team":254,"match":12}"#).unwrap();
    assert_eq!(h.outbox.stats().pending, 1);

    assert_eq!(h.dispatcher.run_cycle().await, 1);

    let item = h.outbox.get(&id).unwrap();
    assert_eq!(item.state, crate::SubmissionState::Succeeded);
    assert_eq!(item.attempts, 1);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, id);
    assert_eq!(calls[0].kind, "match-record");
    assert_eq!(calls[0].payload, br#"{"team":254,"match":12}"#.to_vec());
}
