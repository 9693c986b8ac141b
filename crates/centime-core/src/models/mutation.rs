//! Queued mutation model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Prefix of client-generated placeholder document ids.
///
/// Placeholder ids name entities created offline that have no server id yet.
/// The namespace is disjoint from server-assigned ids and a placeholder is
/// never reused, so a deleted-then-recreated entity always gets a fresh one.
pub const PLACEHOLDER_PREFIX: &str = "temp_";

/// A unique identifier for a queued mutation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Create a new unique mutation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MutationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a queued mutation does to its target document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{kind}")
    }
}

/// Lifecycle status of a queued mutation
///
/// Transitions: `Pending -> Syncing -> (removed | Failed)`, and
/// `Failed -> Pending` on manual retry. Removal happens only after a
/// confirmed successful replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Pending,
    Syncing,
    Failed,
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
        };
        write!(f, "{status}")
    }
}

/// A durable record of one offline-originated change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Unique identifier, stable for the mutation's lifetime
    pub id: MutationId,
    /// Operation kind
    pub kind: MutationKind,
    /// Logical name of the entity set affected
    pub collection: String,
    /// Target document id; a placeholder for creates
    pub target_id: String,
    /// Full field set to write; empty for deletes
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// When the mutation was enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Current lifecycle status
    pub status: MutationStatus,
    /// Last failure message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of failed sync attempts so far
    #[serde(default)]
    pub attempt_count: u32,
}

impl QueuedMutation {
    /// Create a new pending mutation
    #[must_use]
    pub fn new(
        kind: MutationKind,
        collection: impl Into<String>,
        target_id: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            id: MutationId::new(),
            kind,
            collection: collection.into(),
            target_id: target_id.into(),
            payload,
            enqueued_at: Utc::now(),
            status: MutationStatus::Pending,
            error: None,
            attempt_count: 0,
        }
    }

    /// Whether this mutation should be picked up by the next sync run
    /// (pending or failed, but not currently syncing)
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        matches!(self.status, MutationStatus::Pending | MutationStatus::Failed)
    }
}

/// Generate a fresh placeholder document id for an offline create.
#[must_use]
pub fn placeholder_id() -> String {
    format!("{PLACEHOLDER_PREFIX}{}", Uuid::now_v7().simple())
}

/// Check whether a document id belongs to the placeholder namespace.
#[must_use]
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn mutation_id_unique_and_parseable() {
        let id1 = MutationId::new();
        let id2 = MutationId::new();
        assert_ne!(id1, id2);

        let parsed: MutationId = id1.as_str().parse().unwrap();
        assert_eq!(id1, parsed);
    }

    #[test]
    fn placeholder_ids_are_prefixed_and_unique() {
        let a = placeholder_id();
        let b = placeholder_id();
        assert!(is_placeholder_id(&a));
        assert!(is_placeholder_id(&b));
        assert_ne!(a, b);
        assert!(!is_placeholder_id("doc_12345"));
    }

    #[test]
    fn new_mutation_starts_pending() {
        let mutation = QueuedMutation::new(
            MutationKind::Create,
            "transactions",
            placeholder_id(),
            Map::new(),
        );
        assert_eq!(mutation.status, MutationStatus::Pending);
        assert_eq!(mutation.attempt_count, 0);
        assert!(mutation.error.is_none());
        assert!(mutation.is_actionable());
    }

    #[test]
    fn kind_and_status_serialize_lowercase() {
        assert_eq!(serde_json::to_value(MutationKind::Create).unwrap(), json!("create"));
        assert_eq!(serde_json::to_value(MutationKind::Delete).unwrap(), json!("delete"));
        assert_eq!(
            serde_json::to_value(MutationStatus::Failed).unwrap(),
            json!("failed")
        );
    }

    #[test]
    fn mutation_round_trips_through_json() {
        let mut payload = Map::new();
        payload.insert("amount_minor".to_string(), json!(5000));

        let mutation = QueuedMutation::new(MutationKind::Update, "debts", "doc_1", payload);
        let encoded = serde_json::to_string(&mutation).unwrap();
        let decoded: QueuedMutation = serde_json::from_str(&encoded).unwrap();
        assert_eq!(mutation, decoded);
    }

    #[test]
    fn syncing_is_not_actionable() {
        let mut mutation =
            QueuedMutation::new(MutationKind::Delete, "transactions", "doc_9", Map::new());
        mutation.status = MutationStatus::Syncing;
        assert!(!mutation.is_actionable());

        mutation.status = MutationStatus::Failed;
        assert!(mutation.is_actionable());
    }
}
