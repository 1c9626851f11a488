//! End-to-end delivery scenarios.

use super::{exact_policy, Harness, ScriptedTransport};
use crate::{NetworkMonitor, QueueError, QueueStats, SendOutcome, SubmissionState};
use std::time::Duration;

#[tokio::test]
async fn offline_enqueue_is_delivered_when_connectivity_returns() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 3);
    h.network.set_online(false);

    h.outbox.enqueue("match-record", "qm7 red alliance").unwrap();
    assert_eq!(
        h.outbox.stats(),
        QueueStats {
            pending: 1,
            uploading: 0,
            succeeded: 0,
            failed: 0,
            degraded: false,
        }
    );

    // Offline cycles attempt nothing.
    assert_eq!(h.dispatcher.run_cycle().await, 0);
    assert_eq!(h.transport.call_count(), 0);

    h.network.set_online(true);
    assert!(h.network.is_online());
    assert_eq!(h.dispatcher.run_cycle().await, 1);

    let stats = h.outbox.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test]
async fn transient_errors_exhaust_the_attempt_budget() {
    let transport = ScriptedTransport::with_fallback(SendOutcome::TransientError("503 unavailable".into()));
    let h = Harness::new(transport, exact_policy(5), 3);
    let id = h.outbox.enqueue("match-record", "x").unwrap();

    for cycle in 1..=5 {
        assert_eq!(h.dispatcher.run_cycle().await, 1, "cycle {cycle} should attempt the item");
        h.clock.advance(Duration::from_secs(120));
    }

    let item = h.outbox.get(&id).unwrap();
    assert_eq!(item.state, SubmissionState::Failed);
    assert_eq!(item.attempts, 5);
    assert_eq!(
        item.last_error.as_deref(),
        Some("gave up after 5 attempts: 503 unavailable")
    );

    // Never retried automatically.
    assert_eq!(h.dispatcher.run_cycle().await, 0);
    assert_eq!(h.transport.call_count(), 5);
    assert_eq!(h.outbox.list_failed().len(), 1);
}

#[tokio::test]
async fn single_slot_sends_in_enqueue_order() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 1);
    h.outbox.enqueue("match-record", "A").unwrap();
    h.outbox.enqueue("match-record", "B").unwrap();
    h.outbox.enqueue("match-record", "C").unwrap();

    for _ in 0..3 {
        assert_eq!(h.dispatcher.run_cycle().await, 1);
    }

    assert_eq!(h.transport.sent_payloads(), vec!["A", "B", "C"]);
    assert_eq!(h.outbox.stats().succeeded, 3);
}

#[tokio::test]
async fn manual_retry_requeues_a_failed_item() {
    let transport = ScriptedTransport::succeeding();
    transport.push_outcomes([SendOutcome::PermanentError("422 unknown event code".into())]);
    let h = Harness::new(transport, exact_policy(5), 3);
    let id = h.outbox.enqueue("pit-record", "x").unwrap();

    h.dispatcher.run_cycle().await;
    let failed = h.outbox.list_failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, id);
    assert_eq!(failed[0].attempts, 1);

    h.outbox.retry(&id).unwrap();
    let item = h.outbox.get(&id).unwrap();
    assert_eq!(item.state, SubmissionState::Pending);
    assert_eq!(item.attempts, 0);

    assert_eq!(h.dispatcher.run_cycle().await, 1);
    assert_eq!(h.outbox.get(&id).unwrap().state, SubmissionState::Succeeded);
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test]
async fn retry_of_non_failed_item_is_reported() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 3);
    let id = h.outbox.enqueue("pit-record", "x").unwrap();

    assert!(matches!(
        h.outbox.retry(&id),
        Err(QueueError::NotFailed {
            state: SubmissionState::Pending,
            ..
        })
    ));

    h.dispatcher.run_cycle().await;
    assert!(matches!(
        h.outbox.retry(&id),
        Err(QueueError::NotFailed {
            state: SubmissionState::Succeeded,
            ..
        })
    ));
    assert_eq!(h.outbox.get(&id).unwrap().state, SubmissionState::Succeeded);
}

#[tokio::test]
async fn storage_failure_is_reported_and_observable() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 3);
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = h.outbox.subscribe(move |stats| sink.lock().push(*stats));

    h.storage.set_fail_writes(true);
    let err = h.outbox.enqueue("match-record", "x").unwrap_err();
    assert!(matches!(err, QueueError::Storage { id: Some(_), .. }));

    assert!(h.outbox.is_degraded());
    assert!(seen.lock().last().unwrap().degraded);

    // Still delivered best effort this session.
    assert_eq!(h.dispatcher.run_cycle().await, 1);
    assert_eq!(h.outbox.stats().succeeded, 1);
    assert!(h.outbox.stats().degraded);
}

#[tokio::test]
async fn purge_removes_settled_items_only() {
    let transport = ScriptedTransport::succeeding();
    transport.push_outcomes([SendOutcome::Success, SendOutcome::PermanentError("bad".into())]);
    let h = Harness::new(transport, exact_policy(5), 3);
    h.outbox.enqueue("match-record", "a").unwrap();
    h.outbox.enqueue("match-record", "b").unwrap();
    h.dispatcher.run_cycle().await;
    let waiting = h.outbox.enqueue("match-record", "c").unwrap();

    h.clock.advance(Duration::from_secs(8 * 86_400));
    let purged = h.outbox.purge_terminal(Duration::from_secs(7 * 86_400)).unwrap();

    assert_eq!(purged, 2);
    let remaining: Vec<_> = h.outbox.list(None).into_iter().map(|item| item.id).collect();
    assert_eq!(remaining, vec![waiting]);
}
