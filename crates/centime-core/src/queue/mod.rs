//! Offline mutation queue
//!
//! The aggregate over the persistent queue store and its sole mutator.
//! Every operation is a serialized load-modify-save over the store, followed
//! by a synchronous change notification to subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::models::{MutationId, MutationKind, MutationStatus, QueuedMutation, SyncStateSnapshot};
use crate::store::QueueStore;
use crate::Result;

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle identifying one queue-change subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

struct Inner {
    store: Arc<dyn QueueStore>,
    /// Serializes every load-modify-save so no other mutation interleaves
    /// between reading and writing the store.
    store_lock: Mutex<()>,
    subscribers: StdMutex<Vec<(u64, ChangeCallback)>>,
    next_subscriber_id: AtomicU64,
}

/// Durable, ordered collection of not-yet-confirmed mutations.
///
/// Cheap to clone; clones share the same store and subscriber list.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<Inner>,
}

impl OfflineQueue {
    /// Create a queue over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                store_lock: Mutex::new(()),
                subscribers: StdMutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(0),
            }),
        }
    }

    /// Append a new pending mutation, persist it, and notify subscribers.
    ///
    /// Never touches the network; this is the fallback path when a direct
    /// remote write fails.
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        collection: &str,
        target_id: &str,
        payload: Map<String, Value>,
    ) -> Result<MutationId> {
        let mutation = QueuedMutation::new(kind, collection, target_id, payload);
        let id = mutation.id;

        {
            let _guard = self.inner.store_lock.lock().await;
            let mut mutations = self.inner.store.load().await?;
            mutations.push(mutation);
            self.inner.store.save(&mutations).await?;
        }

        tracing::debug!(%id, %kind, collection, target_id, "enqueued offline mutation");
        self.notify();
        Ok(id)
    }

    /// Snapshot of all queued mutations in insertion order.
    pub async fn list_all(&self) -> Result<Vec<QueuedMutation>> {
        let _guard = self.inner.store_lock.lock().await;
        self.inner.store.load().await
    }

    /// The actionable set for sync: pending or failed mutations.
    pub async fn list_pending(&self) -> Result<Vec<QueuedMutation>> {
        let _guard = self.inner.store_lock.lock().await;
        let mutations = self.inner.store.load().await?;
        Ok(mutations
            .into_iter()
            .filter(QueuedMutation::is_actionable)
            .collect())
    }

    /// Update one mutation's status. Transitioning to failed increments its
    /// attempt count. Unknown ids are a no-op.
    pub async fn set_status(
        &self,
        id: MutationId,
        status: MutationStatus,
        error: Option<String>,
    ) -> Result<()> {
        let changed = {
            let _guard = self.inner.store_lock.lock().await;
            let mut mutations = self.inner.store.load().await?;
            match mutations.iter_mut().find(|m| m.id == id) {
                Some(mutation) => {
                    mutation.status = status;
                    if status == MutationStatus::Failed {
                        mutation.attempt_count += 1;
                    }
                    if let Some(message) = error {
                        mutation.error = Some(message);
                    }
                    self.inner.store.save(&mutations).await?;
                    true
                }
                None => {
                    tracing::debug!(%id, "set_status on unknown mutation, ignoring");
                    false
                }
            }
        };

        if changed {
            self.notify();
        }
        Ok(())
    }

    /// Delete a mutation after its confirmed replay. Unknown ids are a no-op.
    pub async fn remove(&self, id: MutationId) -> Result<()> {
        let changed = {
            let _guard = self.inner.store_lock.lock().await;
            let mut mutations = self.inner.store.load().await?;
            let before = mutations.len();
            mutations.retain(|m| m.id != id);
            if mutations.len() == before {
                false
            } else {
                self.inner.store.save(&mutations).await?;
                true
            }
        };

        if changed {
            tracing::debug!(%id, "removed synced mutation");
            self.notify();
        }
        Ok(())
    }

    /// Empty the queue. Administrative use only; normal sync removes
    /// mutations one by one after confirmed replay.
    pub async fn clear(&self) -> Result<()> {
        {
            let _guard = self.inner.store_lock.lock().await;
            self.inner.store.save(&[]).await?;
        }
        tracing::info!("offline queue cleared");
        self.notify();
        Ok(())
    }

    /// Load the advisory sync-state snapshot.
    pub async fn load_sync_hint(&self) -> Result<Option<SyncStateSnapshot>> {
        self.inner.store.load_sync_hint().await
    }

    /// Persist the advisory sync-state snapshot and ping subscribers.
    pub async fn save_sync_hint(&self, hint: &SyncStateSnapshot) -> Result<()> {
        self.inner.store.save_sync_hint(hint).await?;
        self.notify();
        Ok(())
    }

    /// Register a callback invoked after every mutating operation.
    ///
    /// Callbacks run synchronously before the triggering call returns, so a
    /// subscriber always observes state at least as fresh as that operation.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> SubscriberId {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.push((id, Arc::new(callback)));
        }
        SubscriberId(id)
    }

    /// Remove a previously registered subscriber.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.retain(|(subscriber, _)| *subscriber != id.0);
        }
    }

    /// Invoke all subscribers, isolating panics so one failing subscriber
    /// cannot break delivery to the rest.
    fn notify(&self) {
        let snapshot: Vec<ChangeCallback> = match self.inner.subscribers.lock() {
            Ok(subscribers) => subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            Err(_) => return,
        };

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                tracing::warn!("queue change subscriber panicked");
            }
        }
    }
}
