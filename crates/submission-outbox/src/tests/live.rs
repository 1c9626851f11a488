//! Tests for the background dispatcher loop.
//!
//! These tests verify that:
//! - Enqueue and connectivity changes wake the loop
//! - A send that outlives its timeout counts as a transient failure
//! - Shutdown lets in-flight attempts finish
//! - The loop can only be started once
//! - A zero poll interval is refused at start

use super::{exact_policy, immediate_policy, wait_until, Harness, ScriptedTransport};
use crate::{DispatcherConfig, QueueError, SendOutcome, SubmissionState};
use std::time::Duration;

fn quiet_config(max_in_flight: usize, send_timeout: Duration) -> DispatcherConfig {
    DispatcherConfig {
        max_in_flight,
        send_timeout,
        poll_interval: Duration::from_secs(3600),
    }
}

#[tokio::test]
async fn enqueue_wakes_the_loop() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 3);
    let handle = h.dispatcher.start().unwrap();

    let id = h.outbox.enqueue("match-record", "x").unwrap();
    wait_until(|| h.outbox.get(&id).map(|i| i.state) == Some(SubmissionState::Succeeded)).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn connectivity_restored_wakes_the_loop() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 3);
    h.network.set_online(false);
    let handle = h.dispatcher.start().unwrap();

    h.outbox.enqueue("match-record", "A").unwrap();
    h.outbox.enqueue("match-record", "B").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.outbox.stats().pending, 2);

    h.network.set_online(true);
    wait_until(|| h.outbox.stats().succeeded == 2).await;
    assert_eq!(h.transport.sent_payloads(), vec!["A", "B"]);

    handle.shutdown().await;
}

#[tokio::test]
async fn loop_retries_until_delivered() {
    let transport = ScriptedTransport::succeeding();
    transport.push_outcomes([
        SendOutcome::TransientError("502".into()),
        SendOutcome::TransientError("502".into()),
    ]);
    let h = Harness::new(transport, immediate_policy(5), 1);
    let handle = h.dispatcher.start().unwrap();

    let id = h.outbox.enqueue("pit-record", "x").unwrap();
    wait_until(|| h.outbox.get(&id).map(|i| i.state) == Some(SubmissionState::Succeeded)).await;
    assert_eq!(h.outbox.get(&id).unwrap().attempts, 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn slow_send_times_out_as_transient() {
    let transport = ScriptedTransport::succeeding().with_delay(Duration::from_secs(10));
    let h = Harness::with_config(transport, exact_policy(5), quiet_config(1, Duration::from_millis(50)));
    let id = h.outbox.enqueue("match-record", "x").unwrap();

    assert_eq!(h.dispatcher.run_cycle().await, 1);

    let item = h.outbox.get(&id).unwrap();
    assert_eq!(item.state, SubmissionState::Pending);
    assert_eq!(item.attempts, 1);
    assert_eq!(item.last_error.as_deref(), Some("timed out after 50ms"));
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_attempts() {
    let transport = ScriptedTransport::succeeding().with_delay(Duration::from_millis(100));
    let h = Harness::with_config(transport, exact_policy(5), quiet_config(2, Duration::from_secs(5)));
    let handle = h.dispatcher.start().unwrap();

    let id = h.outbox.enqueue("match-record", "x").unwrap();
    wait_until(|| h.transport.call_count() == 1).await;
    assert_eq!(h.outbox.stats().uploading, 1);

    handle.shutdown().await;

    assert_eq!(h.outbox.get(&id).unwrap().state, SubmissionState::Succeeded);

    // No new cycles after shutdown.
    h.outbox.enqueue("match-record", "late").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(h.outbox.stats().pending, 1);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 1);
    let handle = h.dispatcher.start().unwrap();

    assert!(matches!(h.dispatcher.start(), Err(QueueError::AlreadyStarted)));

    handle.shutdown().await;
}

#[tokio::test]
async fn start_with_zero_poll_interval_is_rejected() {
    let h = Harness::with_config(
        ScriptedTransport::succeeding(),
        exact_policy(5),
        DispatcherConfig {
            poll_interval: Duration::ZERO,
            ..quiet_config(1, Duration::from_secs(5))
        },
    );
    h.outbox.enqueue("match-record", "x").unwrap();

    assert!(matches!(h.dispatcher.start(), Err(QueueError::InvalidConfig(_))));
    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.outbox.stats().pending, 1);
}

#[tokio::test]
async fn loop_picks_up_items_present_at_start() {
    let h = Harness::new(ScriptedTransport::succeeding(), exact_policy(5), 3);
    for name in ["A", "B", "C"] {
        h.store.enqueue("match-record", name).unwrap();
    }

    let handle = h.dispatcher.start().unwrap();
    wait_until(|| h.outbox.stats().succeeded == 3).await;
    assert_eq!(h.transport.sent_payloads(), vec!["A", "B", "C"]);

    handle.shutdown().await;
}
