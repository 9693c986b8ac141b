//! In-process remote store for tests and embedders

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::remote::{Document, RemoteError, RemoteResult, RemoteStore};

/// In-memory document store with an availability switch.
///
/// `set_online(false)` makes every call fail with
/// [`RemoteError::Unavailable`]; `inject_failure` fails exactly the next
/// call with a chosen error; `set_latency` delays calls, which is how tests
/// hold a sync run in flight.
#[derive(Default)]
pub struct MemoryRemote {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
    watchers: Mutex<HashMap<String, watch::Sender<Vec<Document>>>>,
    online: AtomicBool,
    next_failure: Mutex<Option<RemoteError>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(BTreeMap::new()),
            watchers: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            next_failure: Mutex::new(None),
            latency: Mutex::new(None),
        }
    }

    /// Toggle simulated connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Fail exactly the next call with `error`.
    pub fn inject_failure(&self, error: RemoteError) {
        *self.next_failure.lock().expect("failure lock poisoned") = Some(error);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("latency lock poisoned") = Some(latency);
    }

    /// Documents currently stored in `collection`.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .expect("collections lock poisoned")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    async fn pause(&self) {
        let latency = *self.latency.lock().expect("latency lock poisoned");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_available(&self) -> RemoteResult<()> {
        if let Some(error) = self.next_failure.lock().expect("failure lock poisoned").take() {
            return Err(error);
        }
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("network unreachable".to_string()))
        }
    }

    fn publish(&self, collection: &str) {
        let current = self.documents(collection);
        if let Some(tx) = self
            .watchers
            .lock()
            .expect("watchers lock poisoned")
            .get(collection)
        {
            tx.send_replace(current);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn create(&self, collection: &str, fields: Map<String, Value>) -> RemoteResult<String> {
        self.pause().await;
        self.check_available()?;

        let id = format!("doc_{}", Uuid::now_v7().simple());
        self.collections
            .lock()
            .expect("collections lock poisoned")
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        self.publish(collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> RemoteResult<()> {
        self.pause().await;
        self.check_available()?;

        {
            let mut collections = self.collections.lock().expect("collections lock poisoned");
            let document = collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
                .ok_or_else(|| RemoteError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            for (key, value) in patch {
                document.fields.insert(key, value);
            }
        }
        self.publish(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        self.pause().await;
        self.check_available()?;

        // Deleting an already-absent document succeeds, keeping replay safe
        // under at-least-once delivery.
        {
            let mut collections = self.collections.lock().expect("collections lock poisoned");
            if let Some(docs) = collections.get_mut(collection) {
                docs.retain(|doc| doc.id != id);
            }
        }
        self.publish(collection);
        Ok(())
    }

    async fn fetch(&self, collection: &str) -> RemoteResult<Vec<Document>> {
        self.pause().await;
        self.check_available()?;
        Ok(self.documents(collection))
    }

    fn watch(&self, collection: &str) -> watch::Receiver<Vec<Document>> {
        let current = self.documents(collection);
        self.watchers
            .lock()
            .expect("watchers lock poisoned")
            .entry(collection.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }
}
