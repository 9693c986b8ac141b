//! Sync engine
//!
//! Replays queued mutations against the remote store when connectivity is
//! available. Failures are isolated per mutation; one bad record never
//! blocks the rest of the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{MutationKind, MutationStatus, QueuedMutation, SyncState};
use crate::net::NetworkMonitor;
use crate::queue::OfflineQueue;
use crate::remote::{RemoteResult, RemoteStore};
use crate::Result;

/// Aggregate outcome of one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub success: usize,
    pub failed: usize,
}

/// Clears the in-flight flag on every exit path, including errors.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Replays the offline queue against the remote store.
pub struct SyncEngine {
    queue: OfflineQueue,
    remote: Arc<dyn RemoteStore>,
    monitor: NetworkMonitor,
    syncing: AtomicBool,
    last_sync_time: StdMutex<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(queue: OfflineQueue, remote: Arc<dyn RemoteStore>, monitor: NetworkMonitor) -> Self {
        Self {
            queue,
            remote,
            monitor,
            syncing: AtomicBool::new(false),
            last_sync_time: StdMutex::new(None),
        }
    }

    /// Replay all pending and failed mutations in enqueue order.
    ///
    /// No-op returning `{0, 0}` when offline or when a run is already in
    /// flight. A per-mutation failure marks that mutation failed and moves
    /// on; only a queue store failure aborts the run.
    pub async fn sync(&self) -> Result<SyncReport> {
        if !self.monitor.current().is_online {
            tracing::debug!("skipping sync while offline");
            return Ok(SyncReport::default());
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("sync already in progress");
            return Ok(SyncReport::default());
        }
        let _guard = SyncingGuard(&self.syncing);

        self.recover_stale().await?;
        let pending = self.queue.list_pending().await?;
        if pending.is_empty() {
            self.stamp_last_sync();
            self.persist_hint().await;
            return Ok(SyncReport::default());
        }

        tracing::info!(count = pending.len(), "replaying offline mutations");
        let mut report = SyncReport::default();
        for mutation in pending {
            self.queue
                .set_status(mutation.id, MutationStatus::Syncing, None)
                .await?;

            match self.replay(&mutation).await {
                Ok(()) => {
                    self.queue.remove(mutation.id).await?;
                    report.success += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        id = %mutation.id,
                        kind = %mutation.kind,
                        collection = mutation.collection,
                        %error,
                        "mutation replay failed, keeping it queued"
                    );
                    self.queue
                        .set_status(mutation.id, MutationStatus::Failed, Some(error.to_string()))
                        .await?;
                    report.failed += 1;
                }
            }
        }

        self.stamp_last_sync();
        self.persist_hint().await;
        tracing::info!(
            success = report.success,
            failed = report.failed,
            "sync run complete"
        );
        Ok(report)
    }

    /// Reset mutations left in `syncing` by a crashed or aborted run.
    ///
    /// The re-entrancy guard is held here, so no replay is in flight in
    /// this process; any persisted `syncing` status is stale and the
    /// mutation would otherwise never be picked up again.
    async fn recover_stale(&self) -> Result<()> {
        let stale: Vec<QueuedMutation> = self
            .queue
            .list_all()
            .await?
            .into_iter()
            .filter(|m| m.status == MutationStatus::Syncing)
            .collect();

        for mutation in stale {
            tracing::warn!(id = %mutation.id, "recovering mutation stuck in syncing");
            self.queue
                .set_status(mutation.id, MutationStatus::Pending, None)
                .await?;
        }
        Ok(())
    }

    /// Reset every failed mutation to pending, then sync.
    pub async fn retry_failed(&self) -> Result<SyncReport> {
        let failed: Vec<QueuedMutation> = self
            .queue
            .list_all()
            .await?
            .into_iter()
            .filter(|m| m.status == MutationStatus::Failed)
            .collect();

        for mutation in &failed {
            self.queue
                .set_status(mutation.id, MutationStatus::Pending, None)
                .await?;
        }

        self.sync().await
    }

    /// Current derived sync state. The queue remains the source of truth;
    /// this is recomputed on every call.
    pub async fn sync_state(&self) -> Result<SyncState> {
        let mutations = self.queue.list_all().await?;
        let failed_count = mutations
            .iter()
            .filter(|m| m.status == MutationStatus::Failed)
            .count();
        Ok(SyncState {
            is_syncing: self.syncing.load(Ordering::SeqCst),
            pending_count: mutations.len(),
            failed_count,
            last_sync_time: *self.last_sync_time.lock().expect("sync time lock poisoned"),
        })
    }

    /// Spawn a task that triggers a sync shortly after every
    /// offline-to-online transition.
    pub fn spawn_auto_sync(self: &Arc<Self>, debounce: Duration) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = engine.monitor.subscribe();
        tokio::spawn(async move {
            let mut was_online = rx.borrow().is_online;
            while rx.changed().await.is_ok() {
                let is_online = rx.borrow_and_update().is_online;
                if is_online && !was_online {
                    tokio::time::sleep(debounce).await;
                    match engine.sync().await {
                        Ok(report) => tracing::debug!(
                            success = report.success,
                            failed = report.failed,
                            "auto sync finished"
                        ),
                        Err(error) => tracing::warn!(%error, "auto sync failed"),
                    }
                }
                was_online = is_online;
            }
        })
    }

    async fn replay(&self, mutation: &QueuedMutation) -> RemoteResult<()> {
        match mutation.kind {
            MutationKind::Create => {
                // The placeholder id is never sent; the server assigns its
                // own id for the new document.
                self.remote
                    .create(&mutation.collection, mutation.payload.clone())
                    .await?;
                Ok(())
            }
            MutationKind::Update => {
                self.remote
                    .update(&mutation.collection, &mutation.target_id, mutation.payload.clone())
                    .await
            }
            MutationKind::Delete => {
                self.remote
                    .delete(&mutation.collection, &mutation.target_id)
                    .await
            }
        }
    }

    fn stamp_last_sync(&self) {
        *self.last_sync_time.lock().expect("sync time lock poisoned") = Some(Utc::now());
    }

    /// Best-effort persistence of the advisory sync-state snapshot.
    async fn persist_hint(&self) {
        let state = match self.sync_state().await {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(%error, "could not derive sync state for snapshot");
                return;
            }
        };
        if let Err(error) = self.queue.save_sync_hint(&state.snapshot()).await {
            tracing::warn!(%error, "failed to persist sync state snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map, Value};

    use super::*;
    use crate::models::{collections, MutationKind, Transaction, TransactionKind};
    use crate::net::ConnectionKind;
    use crate::remote::{MemoryRemote, RemoteError};
    use crate::services::TransactionService;
    use crate::store::MemoryStore;

    struct Harness {
        remote: Arc<MemoryRemote>,
        queue: OfflineQueue,
        monitor: NetworkMonitor,
        engine: Arc<SyncEngine>,
    }

    fn harness() -> Harness {
        let remote = Arc::new(MemoryRemote::new());
        let queue = OfflineQueue::new(Arc::new(MemoryStore::new()));
        let monitor = NetworkMonitor::default();
        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            remote.clone(),
            monitor.clone(),
        ));
        Harness {
            remote,
            queue,
            monitor,
            engine,
        }
    }

    fn payload(key: &str, value: i64) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(key.to_string(), json!(value));
        map
    }

    #[tokio::test]
    async fn offline_sync_is_a_noop() {
        let h = harness();
        h.monitor.set_offline();
        h.queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload("v", 1))
            .await
            .unwrap();

        let report = h.engine.sync().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(h.queue.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_stamps_last_sync_time() {
        let h = harness();
        assert!(h.engine.sync_state().await.unwrap().last_sync_time.is_none());

        let report = h.engine.sync().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert!(h.engine.sync_state().await.unwrap().last_sync_time.is_some());
    }

    #[tokio::test]
    async fn offline_create_replays_after_reconnect() {
        let h = harness();
        h.remote.set_online(false);
        h.monitor.set_offline();

        let service = TransactionService::new(h.remote.clone(), h.queue.clone());
        service
            .add(&Transaction::new("user_1", TransactionKind::Expense, 5000))
            .await
            .unwrap();
        assert_eq!(h.queue.list_pending().await.unwrap().len(), 1);

        h.remote.set_online(true);
        h.monitor.set_online(ConnectionKind::Wifi);
        let report = h.engine.sync().await.unwrap();
        assert_eq!(report, SyncReport { success: 1, failed: 0 });

        assert!(h.queue.list_all().await.unwrap().is_empty());
        let docs = h.remote.documents(collections::TRANSACTIONS);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields.get("amount_minor"), Some(&json!(5000)));
        assert!(docs[0].id.starts_with("doc_"));
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let h = harness();
        let failing = h
            .queue
            .enqueue(MutationKind::Update, collections::DEBTS, "doc_missing", payload("v", 1))
            .await
            .unwrap();
        h.queue
            .enqueue(MutationKind::Create, collections::DEBTS, "temp_b", payload("v", 2))
            .await
            .unwrap();

        let report = h.engine.sync().await.unwrap();
        assert_eq!(report, SyncReport { success: 1, failed: 1 });

        let remaining = h.queue.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, failing);
        assert_eq!(remaining[0].status, MutationStatus::Failed);
        assert_eq!(remaining[0].attempt_count, 1);
        assert!(remaining[0].error.as_deref().unwrap().contains("not found"));
        assert_eq!(h.remote.documents(collections::DEBTS).len(), 1);
    }

    #[tokio::test]
    async fn replay_applies_same_target_updates_in_enqueue_order() {
        let h = harness();
        let id = h
            .remote
            .create(collections::TRANSACTIONS, payload("v", 0))
            .await
            .unwrap();

        h.queue
            .enqueue(MutationKind::Update, collections::TRANSACTIONS, &id, payload("v", 1))
            .await
            .unwrap();
        h.queue
            .enqueue(MutationKind::Update, collections::TRANSACTIONS, &id, payload("v", 2))
            .await
            .unwrap();

        let report = h.engine.sync().await.unwrap();
        assert_eq!(report, SyncReport { success: 2, failed: 0 });

        // Last writer by enqueue order wins.
        let docs = h.remote.documents(collections::TRANSACTIONS);
        assert_eq!(docs[0].fields.get("v"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn failed_then_retried_mutation_lands_exactly_once() {
        let h = harness();
        h.queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload("v", 7))
            .await
            .unwrap();

        h.remote
            .inject_failure(RemoteError::Unavailable("flaky".to_string()));
        let first = h.engine.sync().await.unwrap();
        assert_eq!(first, SyncReport { success: 0, failed: 1 });
        assert!(h.remote.documents(collections::TRANSACTIONS).is_empty());

        let second = h.engine.retry_failed().await.unwrap();
        assert_eq!(second, SyncReport { success: 1, failed: 0 });
        assert_eq!(h.remote.documents(collections::TRANSACTIONS).len(), 1);
        assert!(h.queue.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_sync_returns_zero_and_processes_nothing_twice() {
        let h = harness();
        h.remote.set_latency(Duration::from_millis(50));
        h.queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload("v", 1))
            .await
            .unwrap();

        let engine = h.engine.clone();
        let in_flight = tokio::spawn(async move { engine.sync().await.unwrap() });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let reentrant = h.engine.sync().await.unwrap();
        assert_eq!(reentrant, SyncReport::default());

        let first = in_flight.await.unwrap();
        assert_eq!(first, SyncReport { success: 1, failed: 0 });
        assert_eq!(h.remote.documents(collections::TRANSACTIONS).len(), 1);
    }

    #[tokio::test]
    async fn mutation_stuck_in_syncing_is_replayed_after_restart() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MemoryRemote::new());

        let queue = OfflineQueue::new(store.clone());
        let id = queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload("v", 1))
            .await
            .unwrap();
        queue.set_status(id, MutationStatus::Syncing, None).await.unwrap();

        // Simulated crash mid-replay: fresh queue and engine over the same
        // store, with the record still marked syncing on disk.
        let queue = OfflineQueue::new(store);
        assert!(queue.list_pending().await.unwrap().is_empty());

        let engine = SyncEngine::new(queue.clone(), remote.clone(), NetworkMonitor::default());
        let report = engine.sync().await.unwrap();
        assert_eq!(report, SyncReport { success: 1, failed: 0 });
        assert!(queue.list_all().await.unwrap().is_empty());
        assert_eq!(remote.documents(collections::TRANSACTIONS).len(), 1);
    }

    #[tokio::test]
    async fn sync_state_counts_pending_and_failed() {
        let h = harness();
        h.queue
            .enqueue(MutationKind::Create, collections::DEBTS, "temp_a", payload("v", 1))
            .await
            .unwrap();
        let failed = h
            .queue
            .enqueue(MutationKind::Update, collections::DEBTS, "doc_b", payload("v", 2))
            .await
            .unwrap();
        h.queue
            .set_status(failed, MutationStatus::Failed, Some("offline".to_string()))
            .await
            .unwrap();

        let state = h.engine.sync_state().await.unwrap();
        assert!(!state.is_syncing);
        assert_eq!(state.pending_count, 2);
        assert_eq!(state.failed_count, 1);
    }

    #[tokio::test]
    async fn sync_persists_an_advisory_snapshot() {
        let h = harness();
        h.queue
            .enqueue(MutationKind::Update, collections::DEBTS, "doc_missing", payload("v", 1))
            .await
            .unwrap();

        h.engine.sync().await.unwrap();

        let hint = h.queue.load_sync_hint().await.unwrap().unwrap();
        assert_eq!(hint.pending_count, 1);
        assert_eq!(hint.failed_count, 1);
        assert!(hint.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn auto_sync_runs_after_reconnect() {
        let h = harness();
        h.remote.set_online(false);
        h.monitor.set_offline();
        h.queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload("v", 1))
            .await
            .unwrap();

        let task = h.engine.spawn_auto_sync(Duration::from_millis(10));

        h.remote.set_online(true);
        h.monitor.set_online(ConnectionKind::Wifi);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(h.queue.list_all().await.unwrap().is_empty());
        assert_eq!(h.remote.documents(collections::TRANSACTIONS).len(), 1);
        task.abort();
    }
}
