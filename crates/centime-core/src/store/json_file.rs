//! JSON file implementation of the queue store

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::OfflineConfig;
use crate::models::{QueuedMutation, SyncStateSnapshot};
use crate::store::QueueStore;
use crate::{Error, Result};

/// Current on-disk queue schema version.
const QUEUE_SCHEMA_VERSION: u32 = 1;

/// Default file name for the serialized mutation list.
pub const DEFAULT_QUEUE_FILE: &str = "queue.json";
/// Default file name for the advisory sync-state snapshot.
pub const DEFAULT_SYNC_STATE_FILE: &str = "sync_state.json";

#[derive(Serialize)]
struct QueueEnvelopeRef<'a> {
    version: u32,
    mutations: &'a [QueuedMutation],
}

#[derive(Deserialize)]
struct QueueEnvelope {
    version: u32,
    #[serde(default)]
    mutations: Vec<QueuedMutation>,
}

/// Queue store backed by JSON files in a storage directory.
///
/// The queue lives in one file under a well-known name, the advisory sync
/// snapshot in a sibling file. Writes go through a temp file in the same
/// directory followed by a rename, so a partially written file is never
/// visible to a subsequent load.
pub struct JsonFileStore {
    dir: PathBuf,
    queue_file: String,
    sync_state_file: String,
}

impl JsonFileStore {
    /// Create a store rooted at `dir` with the default file names.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            queue_file: DEFAULT_QUEUE_FILE.to_string(),
            sync_state_file: DEFAULT_SYNC_STATE_FILE.to_string(),
        }
    }

    /// Create a store from an [`OfflineConfig`].
    #[must_use]
    pub fn from_config(config: &OfflineConfig) -> Self {
        Self {
            dir: config.storage_dir.clone(),
            queue_file: config.queue_file.clone(),
            sync_state_file: config.sync_state_file.clone(),
        }
    }

    fn queue_path(&self) -> PathBuf {
        self.dir.join(&self.queue_file)
    }

    fn sync_state_path(&self) -> PathBuf {
        self.dir.join(&self.sync_state_file)
    }

    /// Read and parse a JSON file; `Ok(None)` when it does not exist yet.
    fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(Error::Storage(format!(
                    "failed to read {}: {error}",
                    path.display()
                )))
            }
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|error| {
            Error::Storage(format!("corrupted store file {}: {error}", path.display()))
        })
    }

    /// Serialize `value` and move it into place atomically.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|error| {
            Error::Storage(format!(
                "failed to create storage dir {}: {error}",
                self.dir.display()
            ))
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|error| Error::Storage(format!("failed to create temp file: {error}")))?;
        serde_json::to_writer_pretty(&mut tmp, value)
            .map_err(|error| Error::Storage(format!("failed to serialize store: {error}")))?;
        tmp.flush()
            .map_err(|error| Error::Storage(format!("failed to flush store: {error}")))?;
        tmp.persist(path).map_err(|error| {
            Error::Storage(format!("failed to replace {}: {error}", path.display()))
        })?;

        Ok(())
    }
}

#[async_trait]
impl QueueStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<QueuedMutation>> {
        let Some(envelope) = Self::read_json::<QueueEnvelope>(&self.queue_path())? else {
            return Ok(Vec::new());
        };

        if envelope.version != QUEUE_SCHEMA_VERSION {
            return Err(Error::Storage(format!(
                "unsupported queue schema version {} (expected {QUEUE_SCHEMA_VERSION})",
                envelope.version
            )));
        }

        Ok(envelope.mutations)
    }

    async fn save(&self, mutations: &[QueuedMutation]) -> Result<()> {
        self.write_json(
            &self.queue_path(),
            &QueueEnvelopeRef {
                version: QUEUE_SCHEMA_VERSION,
                mutations,
            },
        )
    }

    async fn load_sync_hint(&self) -> Result<Option<SyncStateSnapshot>> {
        Self::read_json(&self.sync_state_path())
    }

    async fn save_sync_hint(&self, hint: &SyncStateSnapshot) -> Result<()> {
        self.write_json(&self.sync_state_path(), hint)
    }
}
