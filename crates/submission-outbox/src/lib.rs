//! Durable upload queue for field-recorded submissions.
//!
//! Records are collected on clients that are often offline. Each one is
//! persisted before `enqueue` returns and delivered later, at least once,
//! without flooding the collection service when connectivity returns.
//!
//! This crate provides:
//! - [`QueueStore`]: sole owner of submission items, persisted through
//!   [`outbox_storage::DurableStorage`]
//! - [`Dispatcher`]: control loop that claims eligible items and sends them,
//!   at most `max_in_flight` at a time
//! - [`RetryPolicy`]: exponential backoff with jitter and an attempt budget
//! - [`StatsNotifier`]: full [`QueueStats`] snapshots after every mutation
//! - [`SubmissionOutbox`]: the API the rest of the application uses
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ──claim──▶ InFlight ──success──▶ Succeeded
//!    ▲                  │
//!    ├──transient───────┤  (attempts left)
//!    │                  └──permanent / out of attempts──▶ Failed
//!    └──────────────────────── retry(id) ──────────────────┘
//! ```

mod clock;
mod dispatcher;
mod error;
mod http;
mod item;
mod network;
mod notifier;
mod outbox;
mod retry;
mod stats;
mod store;
mod transport;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DispatchWaker, Dispatcher, DispatcherConfig, DispatcherHandle, WakeReason};
pub use error::{QueueError, QueueResult};
pub use http::{classify_status, HttpTransport, HttpTransportConfig, IDEMPOTENCY_HEADER};
pub use item::{Payload, SubmissionId, SubmissionItem, SubmissionState};
pub use network::{ManualNetworkMonitor, NetworkMonitor};
pub use notifier::{StatsNotifier, Subscription};
pub use outbox::SubmissionOutbox;
pub use retry::{ErrorClass, FailureReason, RetryDecision, RetryPolicy};
pub use stats::QueueStats;
pub use store::{ItemUpdate, QueueStore};
pub use transport::{SendOutcome, SendRequest, SubmissionTransport};
