//! Data models for centime-core

mod finance;
mod mutation;
mod sync_state;

pub use finance::{Debt, DebtDirection, DebtStatus, Repayment, Transaction, TransactionKind};
pub use mutation::{
    is_placeholder_id, placeholder_id, MutationId, MutationKind, MutationStatus, QueuedMutation,
    PLACEHOLDER_PREFIX,
};
pub use sync_state::{SyncState, SyncStateSnapshot};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Collection names used by the domain write services.
pub mod collections {
    pub const TRANSACTIONS: &str = "transactions";
    pub const DEBTS: &str = "debts";
    pub const REPAYMENTS: &str = "repayments";
}

/// Serialize a domain model into a remote document field map.
///
/// Document identity lives outside the field map (the remote store assigns
/// ids), so an `id` key is stripped if the model happens to carry one.
pub fn document_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        other => Err(Error::InvalidInput(format!(
            "expected a JSON object for document fields, got {other}"
        ))),
    }
}
