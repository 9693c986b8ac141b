//! In-memory queue store for tests and embedders

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{QueuedMutation, SyncStateSnapshot};
use crate::store::QueueStore;
use crate::{Error, Result};

/// Queue store held entirely in memory.
///
/// Durable for the lifetime of the process only. Shared via `Arc`, so two
/// queue instances over the same store observe the same state - which is how
/// tests model a process restart. `set_failing` makes every operation return
/// a storage error, for exercising the unreadable-store path.
#[derive(Default)]
pub struct MemoryStore {
    mutations: Mutex<Vec<QueuedMutation>>,
    hint: Mutex<Option<SyncStateSnapshot>>,
    failing: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated medium failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Storage("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load(&self) -> Result<Vec<QueuedMutation>> {
        self.check_available()?;
        Ok(self.mutations.lock().expect("store lock poisoned").clone())
    }

    async fn save(&self, mutations: &[QueuedMutation]) -> Result<()> {
        self.check_available()?;
        *self.mutations.lock().expect("store lock poisoned") = mutations.to_vec();
        Ok(())
    }

    async fn load_sync_hint(&self) -> Result<Option<SyncStateSnapshot>> {
        self.check_available()?;
        Ok(*self.hint.lock().expect("store lock poisoned"))
    }

    async fn save_sync_hint(&self, hint: &SyncStateSnapshot) -> Result<()> {
        self.check_available()?;
        *self.hint.lock().expect("store lock poisoned") = Some(*hint);
        Ok(())
    }
}
