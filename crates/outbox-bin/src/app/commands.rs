//! One-shot queue commands.
//!
//! These open the queue database, act on it and exit. None of them sends
//! anything; delivery happens in `flush` and `run`.

use super::state::open_store;
use outbox_config_and_utils::Paths;
use std::time::Duration;
use submission_outbox::{SubmissionId, SubmissionItem, SubmissionOutbox, SubmissionState};
use tracing::info;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn enqueue(paths: &Paths, kind: &str, payload: Vec<u8>) -> CommandResult {
    let outbox = SubmissionOutbox::new(open_store(paths)?);
    let size = payload.len();
    let id = outbox.enqueue(kind, payload)?;
    info!(id = %id, kind, size, "Queued submission from CLI");
    println!("{id}");
    Ok(())
}

pub fn show_stats(paths: &Paths) -> CommandResult {
    let outbox = SubmissionOutbox::new(open_store(paths)?);
    println!("{}", serde_json::to_string_pretty(&outbox.stats())?);
    Ok(())
}

pub fn list(paths: &Paths, state: Option<&str>) -> CommandResult {
    let filter = state
        .map(|s| SubmissionState::parse(s).ok_or_else(|| format!("unknown state: {s}")))
        .transpose()?;
    let outbox = SubmissionOutbox::new(open_store(paths)?);
    print_items(&outbox.list(filter));
    Ok(())
}

pub fn list_failed(paths: &Paths) -> CommandResult {
    let outbox = SubmissionOutbox::new(open_store(paths)?);
    print_items(&outbox.list_failed());
    Ok(())
}

pub fn retry(paths: &Paths, id: &str) -> CommandResult {
    let outbox = SubmissionOutbox::new(open_store(paths)?);
    outbox.retry(&SubmissionId::from(id))?;
    println!("Submission {id} will be retried");
    Ok(())
}

pub fn purge(paths: &Paths, older_than_days: u32) -> CommandResult {
    let outbox = SubmissionOutbox::new(open_store(paths)?);
    let removed = outbox.purge_terminal(days(older_than_days))?;
    println!("Removed {removed} settled submissions older than {older_than_days} days");
    Ok(())
}

fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 24 * 60 * 60)
}

fn print_items(items: &[SubmissionItem]) {
    if items.is_empty() {
        println!("No submissions");
        return;
    }
    for item in items {
        println!("{}", format_item(item));
    }
}

fn format_item(item: &SubmissionItem) -> String {
    let mut line = format!(
        "{}  {:<10} {:<16} attempts={} enqueued={}",
        item.id,
        item.state.as_str(),
        item.kind,
        item.attempts,
        item.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
    );
    if let Some(error) = &item.last_error {
        line.push_str("  error=");
        line.push_str(error);
    }
    line
}
