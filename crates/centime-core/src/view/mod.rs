//! Merged read view
//!
//! Overlays queued offline mutations on top of the latest remote snapshot
//! so reads reflect local writes immediately, whether or not they have
//! reached the server yet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{watch, Notify};

use crate::models::{MutationKind, QueuedMutation};
use crate::queue::{OfflineQueue, SubscriberId};
use crate::remote::Document;
use crate::Result;

/// One entity as the application should display it.
///
/// `synced` is false for entities carrying any queued local change, whether
/// a not-yet-replayed create or a pending update over a remote document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedEntity {
    pub id: String,
    pub fields: Map<String, Value>,
    pub synced: bool,
}

/// Overlay queued mutations for `collection` onto a remote snapshot.
///
/// Mutations apply in enqueue order: creates insert an unsynced entity
/// keyed by its placeholder id, updates shallow-merge into an entity that
/// exists and mark it unsynced (and are dropped otherwise), deletes remove.
/// Remote documents
/// keep their snapshot order; surviving creates follow in enqueue order.
#[must_use]
pub fn merge(
    remote: &[Document],
    mutations: &[QueuedMutation],
    collection: &str,
) -> Vec<MergedEntity> {
    let mut order: Vec<String> = Vec::with_capacity(remote.len());
    let mut entities: HashMap<String, MergedEntity> = HashMap::with_capacity(remote.len());

    for document in remote {
        order.push(document.id.clone());
        entities.insert(
            document.id.clone(),
            MergedEntity {
                id: document.id.clone(),
                fields: document.fields.clone(),
                synced: true,
            },
        );
    }

    for mutation in mutations {
        if mutation.collection != collection {
            continue;
        }
        match mutation.kind {
            MutationKind::Create => {
                let id = mutation.target_id.clone();
                if !entities.contains_key(&id) {
                    order.push(id.clone());
                }
                entities.insert(
                    id.clone(),
                    MergedEntity {
                        id,
                        fields: mutation.payload.clone(),
                        synced: false,
                    },
                );
            }
            MutationKind::Update => {
                if let Some(entity) = entities.get_mut(&mutation.target_id) {
                    for (key, value) in &mutation.payload {
                        entity.fields.insert(key.clone(), value.clone());
                    }
                    entity.synced = false;
                }
            }
            MutationKind::Delete => {
                entities.remove(&mutation.target_id);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| entities.remove(&id))
        .collect()
}

/// Per-kind sums over merged transactions, in minor currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub income_minor: i64,
    pub expense_minor: i64,
    pub debt_minor: i64,
    pub repayment_minor: i64,
}

impl Totals {
    /// Sum `amount_minor` per transaction kind. Entities missing either
    /// field, or carrying an unknown kind, are skipped.
    #[must_use]
    pub fn from_entities(entities: &[MergedEntity]) -> Self {
        let mut totals = Self::default();
        for entity in entities {
            let Some(kind) = entity.fields.get("kind").and_then(Value::as_str) else {
                continue;
            };
            let Some(amount) = entity.fields.get("amount_minor").and_then(Value::as_i64) else {
                continue;
            };
            match kind {
                "income" => totals.income_minor += amount,
                "expense" => totals.expense_minor += amount,
                "debt" => totals.debt_minor += amount,
                "repayment" => totals.repayment_minor += amount,
                _ => {}
            }
        }
        totals
    }
}

struct ViewInner {
    collection: String,
    queue: OfflineQueue,
    snapshot: StdMutex<Vec<Document>>,
    output: watch::Sender<Vec<MergedEntity>>,
}

/// Live merged view over one collection.
///
/// Recomputes whenever the offline queue changes or a new remote snapshot
/// arrives, and broadcasts the result through a watch channel.
pub struct CollectionView {
    inner: Arc<ViewInner>,
    queue: OfflineQueue,
    subscriber: SubscriberId,
    recompute_task: tokio::task::JoinHandle<()>,
    forward_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CollectionView {
    /// Create a view over `collection`.
    ///
    /// Spawns the recompute task immediately, so this must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn new(collection: &str, queue: OfflineQueue) -> Self {
        let inner = Arc::new(ViewInner {
            collection: collection.to_string(),
            queue: queue.clone(),
            snapshot: StdMutex::new(Vec::new()),
            output: watch::channel(Vec::new()).0,
        });

        let dirty = Arc::new(Notify::new());
        let wake = dirty.clone();
        let subscriber = queue.subscribe(move || wake.notify_one());

        let task_inner = Arc::clone(&inner);
        let recompute_task = tokio::spawn(async move {
            loop {
                dirty.notified().await;
                if let Err(error) = recompute(&task_inner).await {
                    tracing::warn!(
                        collection = task_inner.collection,
                        %error,
                        "merged view recompute failed"
                    );
                }
            }
        });

        Self {
            inner,
            queue,
            subscriber,
            recompute_task,
            forward_task: StdMutex::new(None),
        }
    }

    /// Replace the remote snapshot and rebroadcast the merged result.
    pub async fn set_snapshot(&self, documents: Vec<Document>) -> Result<()> {
        {
            let mut snapshot = self
                .inner
                .snapshot
                .lock()
                .expect("view snapshot lock poisoned");
            *snapshot = documents;
        }
        recompute(&self.inner).await
    }

    /// Keep the snapshot current from a remote live-query subscription.
    pub fn follow_remote(&self, mut rx: watch::Receiver<Vec<Document>>) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                let documents = rx.borrow_and_update().clone();
                {
                    let mut snapshot =
                        inner.snapshot.lock().expect("view snapshot lock poisoned");
                    *snapshot = documents;
                }
                if let Err(error) = recompute(&inner).await {
                    tracing::warn!(
                        collection = inner.collection,
                        %error,
                        "merged view recompute failed"
                    );
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut slot = self.forward_task.lock().expect("forward task lock poisoned");
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Compute the merged result directly from the queue and snapshot.
    pub async fn current(&self) -> Result<Vec<MergedEntity>> {
        let mutations = self.inner.queue.list_all().await?;
        let snapshot = self
            .inner
            .snapshot
            .lock()
            .expect("view snapshot lock poisoned")
            .clone();
        Ok(merge(&snapshot, &mutations, &self.inner.collection))
    }

    /// Subscribe to merged results. Receives the value current at
    /// subscription time, then every recomputed one.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Vec<MergedEntity>> {
        self.inner.output.subscribe()
    }
}

impl Drop for CollectionView {
    fn drop(&mut self) {
        self.queue.unsubscribe(self.subscriber);
        self.recompute_task.abort();
        if let Ok(mut slot) = self.forward_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

async fn recompute(inner: &ViewInner) -> Result<()> {
    let mutations = inner.queue.list_all().await?;
    let snapshot = inner
        .snapshot
        .lock()
        .expect("view snapshot lock poisoned")
        .clone();
    let merged = merge(&snapshot, &mutations, &inner.collection);
    inner.output.send_replace(merged);
    Ok(())
}
