//! Derived sync state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ephemeral sync status derived from the queue on every change.
///
/// The queue is the source of truth; this is recomputed, never stored
/// authoritatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncState {
    /// Whether a sync run is currently in flight
    pub is_syncing: bool,
    /// Total mutations still in the queue
    pub pending_count: usize,
    /// Mutations whose last replay attempt failed
    pub failed_count: usize,
    /// Completion time of the most recent sync run
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Advisory snapshot for best-effort persistence next to the queue.
    #[must_use]
    pub const fn snapshot(&self) -> SyncStateSnapshot {
        SyncStateSnapshot {
            pending_count: self.pending_count,
            failed_count: self.failed_count,
            last_sync_time: self.last_sync_time,
        }
    }
}

/// Best-effort persisted snapshot of [`SyncState`].
///
/// Advisory only: rebuildable from the queue, used for cold-start display
/// before the first sync run of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateSnapshot {
    pub pending_count: usize,
    pub failed_count: usize,
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
}
