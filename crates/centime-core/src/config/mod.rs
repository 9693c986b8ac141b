//! Offline engine configuration
//!
//! Storage locations and sync tuning shared by all clients embedding the
//! core. Values are safe to persist alongside app settings; nothing secret
//! lives here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::QueuedMutation;
use crate::{Error, Result};

const DEFAULT_STORAGE_DIR: &str = ".centime";
const DEFAULT_AUTO_SYNC_DEBOUNCE_MS: u64 = 500;

fn default_storage_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_DIR)
}

fn default_queue_file() -> String {
    crate::store::DEFAULT_QUEUE_FILE.to_string()
}

fn default_sync_state_file() -> String {
    crate::store::DEFAULT_SYNC_STATE_FILE.to_string()
}

fn default_auto_sync_debounce_ms() -> u64 {
    DEFAULT_AUTO_SYNC_DEBOUNCE_MS
}

/// Configuration for the offline queue, store, and sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfflineConfig {
    /// Directory holding the queue and sync-state files
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// File name of the serialized mutation list
    #[serde(default = "default_queue_file")]
    pub queue_file: String,
    /// File name of the advisory sync-state snapshot
    #[serde(default = "default_sync_state_file")]
    pub sync_state_file: String,
    /// Delay between an offline-to-online transition and the auto sync run
    #[serde(default = "default_auto_sync_debounce_ms")]
    pub auto_sync_debounce_ms: u64,
    /// Advisory cap on replay attempts. The engine never drops a mutation on
    /// its own; this only feeds [`OfflineConfig::attempts_exhausted`] so a
    /// caller can surface or act on stuck mutations.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            queue_file: default_queue_file(),
            sync_state_file: default_sync_state_file(),
            auto_sync_debounce_ms: DEFAULT_AUTO_SYNC_DEBOUNCE_MS,
            max_attempts: None,
        }
    }
}

impl OfflineConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency of the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_file_name(&self.queue_file, "queue_file")?;
        validate_file_name(&self.sync_state_file, "sync_state_file")?;
        if self.queue_file == self.sync_state_file {
            return Err(Error::InvalidInput(
                "queue_file and sync_state_file must differ".to_string(),
            ));
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(Error::InvalidInput(
                "storage_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Auto-sync debounce as a [`Duration`].
    #[must_use]
    pub const fn auto_sync_debounce(&self) -> Duration {
        Duration::from_millis(self.auto_sync_debounce_ms)
    }

    /// Whether a mutation has used up the advisory attempt budget.
    #[must_use]
    pub fn attempts_exhausted(&self, mutation: &QueuedMutation) -> bool {
        self.max_attempts
            .is_some_and(|cap| mutation.attempt_count >= cap)
    }
}

fn validate_file_name(name: &str, field: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidInput(format!(
            "{field} must be a bare file name, got '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::Map;

    use super::*;
    use crate::models::{MutationKind, MutationStatus};

    #[test]
    fn default_config_validates() {
        let config = OfflineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.auto_sync_debounce(), Duration::from_millis(500));
        assert!(config.max_attempts.is_none());
    }

    #[test]
    fn rejects_colliding_file_names() {
        let config = OfflineConfig {
            sync_state_file: OfflineConfig::default().queue_file,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_path_separators_in_file_names() {
        let config = OfflineConfig {
            queue_file: "nested/queue.json".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config: OfflineConfig =
            serde_json::from_str(r#"{"storage_dir": "/tmp/centime", "max_attempts": 5}"#).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/centime"));
        assert_eq!(config.max_attempts, Some(5));
        assert_eq!(config.auto_sync_debounce_ms, 500);
    }

    #[test]
    fn attempts_exhausted_respects_the_advisory_cap() {
        let mut mutation =
            QueuedMutation::new(MutationKind::Update, "debts", "doc_1", Map::new());
        mutation.status = MutationStatus::Failed;
        mutation.attempt_count = 3;

        let uncapped = OfflineConfig::default();
        assert!(!uncapped.attempts_exhausted(&mutation));

        let capped = OfflineConfig {
            max_attempts: Some(3),
            ..Default::default()
        };
        assert!(capped.attempts_exhausted(&mutation));
    }
}
