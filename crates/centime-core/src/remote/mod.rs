//! Remote document store contract
//!
//! The remote store is an external collaborator: per-collection documents
//! with server-assigned ids, plus a live-query subscription producing full
//! result sets on change. The core only depends on this trait; clients plug
//! in their real backend, tests use [`MemoryRemote`].

mod memory;

pub use memory::MemoryRemote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;

/// Failures reported by the remote store.
///
/// The sync engine treats every variant the same way: the mutation stays
/// queued and is marked failed. Without collaborator-supplied error
/// classification there is no safe way to tell "permanently wrong" from
/// "transiently wrong".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network failure or timeout reaching the store
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    /// Write to a document the user may no longer own
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Target document does not exist
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    /// Payload rejected by server-side validation
    #[error("write rejected: {0}")]
    Rejected(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A document as stored remotely: server-assigned id plus field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Remote document store operations used by the core.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document; the store assigns and returns its id.
    async fn create(&self, collection: &str, fields: Map<String, Value>) -> RemoteResult<String>;

    /// Shallow-merge `patch` into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Map<String, Value>)
        -> RemoteResult<()>;

    /// Delete a document.
    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()>;

    /// One-shot fetch of a collection's documents.
    async fn fetch(&self, collection: &str) -> RemoteResult<Vec<Document>>;

    /// Live-query subscription: full result sets on every change.
    fn watch(&self, collection: &str) -> watch::Receiver<Vec<Document>>;
}
