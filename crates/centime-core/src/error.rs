//! Error types for centime-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using centime-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in centime-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Persistent queue store unreadable or unwritable. The queue must not
    /// be assumed empty after this; callers retry the load instead.
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote document store error surfaced to a direct caller
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
