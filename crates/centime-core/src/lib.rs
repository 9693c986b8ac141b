//! centime-core - Core library for Centime
//!
//! The offline mutation queue and reconciliation engine shared by all
//! Centime clients: durable queueing of create/update/delete intents while
//! disconnected, replay against the remote document store on reconnect, and
//! a merged view that overlays pending changes on remote-confirmed state.

pub mod config;
pub mod error;
pub mod models;
pub mod net;
pub mod queue;
pub mod remote;
pub mod services;
pub mod store;
pub mod sync;
pub mod view;

pub use error::{Error, Result};
pub use models::{MutationId, MutationKind, MutationStatus, QueuedMutation};
pub use queue::OfflineQueue;
pub use sync::{SyncEngine, SyncReport};
