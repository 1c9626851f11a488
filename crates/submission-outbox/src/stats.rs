//! Aggregate queue counts.

use crate::item::{SubmissionItem, SubmissionState};
use serde::{Deserialize, Serialize};

/// Snapshot of the queue, recomputed from the full item list.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub uploading: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Durable storage failed this session; new items may not survive a restart.
    pub degraded: bool,
}

impl QueueStats {
    /// Count items by state.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a SubmissionItem>, degraded: bool) -> Self {
        let mut stats = QueueStats {
            degraded,
            ..QueueStats::default()
        };
        for item in items {
            match item.state {
                SubmissionState::Pending => stats.pending += 1,
                SubmissionState::InFlight => stats.uploading += 1,
                SubmissionState::Succeeded => stats.succeeded += 1,
                SubmissionState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Items not yet in a terminal state.
    pub fn total_queued(&self) -> usize {
        self.pending + self.uploading
    }

    /// Every item currently held by the store.
    pub fn total(&self) -> usize {
        self.total_queued() + self.succeeded + self.failed
    }
}
