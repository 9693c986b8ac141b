//! Persistent queue store
//!
//! Durable, process-surviving persistence of the full mutation list as one
//! serialized collection. The [`crate::queue::OfflineQueue`] is the only
//! component that writes through this trait.

mod json_file;
mod memory;

pub use json_file::{JsonFileStore, DEFAULT_QUEUE_FILE, DEFAULT_SYNC_STATE_FILE};
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::models::{QueuedMutation, SyncStateSnapshot};
use crate::Result;

/// Durable storage of the pending mutation list.
///
/// `load` returns mutations in insertion order; `save` replaces the whole
/// collection atomically from the caller's perspective. A failed load means
/// "queue temporarily unreadable", never "queue empty" - implementations
/// must not clear state on a read failure.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load all persisted mutations, oldest first.
    async fn load(&self) -> Result<Vec<QueuedMutation>>;

    /// Replace the persisted collection with `mutations`.
    async fn save(&self, mutations: &[QueuedMutation]) -> Result<()>;

    /// Load the advisory sync-state snapshot, if one was saved.
    async fn load_sync_hint(&self) -> Result<Option<SyncStateSnapshot>>;

    /// Persist the advisory sync-state snapshot.
    async fn save_sync_hint(&self, hint: &SyncStateSnapshot) -> Result<()>;
}
