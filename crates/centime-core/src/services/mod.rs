//! Domain write services
//!
//! The "write now or queue it" contract: every create/update/delete tries
//! the remote store first and falls back to exactly one queue entry on any
//! remote failure. Callers never branch on connectivity; a queued write is
//! a success outcome distinguished only by its status.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::models::{
    collections, document_fields, placeholder_id, Debt, DebtStatus, MutationKind, Repayment,
    Transaction,
};
use crate::queue::OfflineQueue;
use crate::remote::RemoteStore;
use crate::{Error, Result};

/// How a write was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Confirmed by the remote store
    Synced,
    /// Recorded in the offline queue, will sync later
    Queued,
}

/// Result of a write-or-queue call. Both statuses are success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Server-assigned id when synced; placeholder or target id when queued
    pub id: String,
    pub status: WriteStatus,
}

impl WriteOutcome {
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.status == WriteStatus::Synced
    }
}

/// Result of recording a repayment: two independent write-or-queue legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepaymentOutcome {
    /// The repayment document create
    pub repayment: WriteOutcome,
    /// The debt balance/status update
    pub debt_update: WriteOutcome,
}

async fn create_or_queue(
    remote: &dyn RemoteStore,
    queue: &OfflineQueue,
    collection: &str,
    fields: Map<String, Value>,
) -> Result<WriteOutcome> {
    match remote.create(collection, fields.clone()).await {
        Ok(id) => Ok(WriteOutcome {
            id,
            status: WriteStatus::Synced,
        }),
        Err(error) => {
            tracing::info!(collection, %error, "remote create failed, queuing offline");
            let target_id = placeholder_id();
            queue
                .enqueue(MutationKind::Create, collection, &target_id, fields)
                .await?;
            Ok(WriteOutcome {
                id: target_id,
                status: WriteStatus::Queued,
            })
        }
    }
}

async fn update_or_queue(
    remote: &dyn RemoteStore,
    queue: &OfflineQueue,
    collection: &str,
    id: &str,
    patch: Map<String, Value>,
) -> Result<WriteOutcome> {
    match remote.update(collection, id, patch.clone()).await {
        Ok(()) => Ok(WriteOutcome {
            id: id.to_string(),
            status: WriteStatus::Synced,
        }),
        Err(error) => {
            tracing::info!(collection, id, %error, "remote update failed, queuing offline");
            queue
                .enqueue(MutationKind::Update, collection, id, patch)
                .await?;
            Ok(WriteOutcome {
                id: id.to_string(),
                status: WriteStatus::Queued,
            })
        }
    }
}

async fn delete_or_queue(
    remote: &dyn RemoteStore,
    queue: &OfflineQueue,
    collection: &str,
    id: &str,
) -> Result<WriteOutcome> {
    match remote.delete(collection, id).await {
        Ok(()) => Ok(WriteOutcome {
            id: id.to_string(),
            status: WriteStatus::Synced,
        }),
        Err(error) => {
            tracing::info!(collection, id, %error, "remote delete failed, queuing offline");
            queue
                .enqueue(MutationKind::Delete, collection, id, Map::new())
                .await?;
            Ok(WriteOutcome {
                id: id.to_string(),
                status: WriteStatus::Queued,
            })
        }
    }
}

/// Write service for the `transactions` collection.
#[derive(Clone)]
pub struct TransactionService {
    remote: Arc<dyn RemoteStore>,
    queue: OfflineQueue,
}

impl TransactionService {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, queue: OfflineQueue) -> Self {
        Self { remote, queue }
    }

    /// Record a transaction; remote first, queue fallback.
    pub async fn add(&self, transaction: &Transaction) -> Result<WriteOutcome> {
        let fields = document_fields(transaction)?;
        create_or_queue(
            self.remote.as_ref(),
            &self.queue,
            collections::TRANSACTIONS,
            fields,
        )
        .await
    }

    /// Apply a partial update to a transaction.
    pub async fn update(&self, id: &str, patch: Map<String, Value>) -> Result<WriteOutcome> {
        update_or_queue(
            self.remote.as_ref(),
            &self.queue,
            collections::TRANSACTIONS,
            id,
            patch,
        )
        .await
    }

    /// Delete a transaction.
    pub async fn delete(&self, id: &str) -> Result<WriteOutcome> {
        delete_or_queue(
            self.remote.as_ref(),
            &self.queue,
            collections::TRANSACTIONS,
            id,
        )
        .await
    }
}

/// Write service for the `debts` and `repayments` collections.
#[derive(Clone)]
pub struct DebtService {
    remote: Arc<dyn RemoteStore>,
    queue: OfflineQueue,
}

impl DebtService {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, queue: OfflineQueue) -> Self {
        Self { remote, queue }
    }

    /// Record a debt; remote first, queue fallback.
    pub async fn add(&self, debt: &Debt) -> Result<WriteOutcome> {
        let fields = document_fields(debt)?;
        create_or_queue(self.remote.as_ref(), &self.queue, collections::DEBTS, fields).await
    }

    /// Apply a partial update to a debt.
    pub async fn update(&self, id: &str, patch: Map<String, Value>) -> Result<WriteOutcome> {
        update_or_queue(self.remote.as_ref(), &self.queue, collections::DEBTS, id, patch).await
    }

    /// Delete a debt.
    pub async fn delete(&self, id: &str) -> Result<WriteOutcome> {
        delete_or_queue(self.remote.as_ref(), &self.queue, collections::DEBTS, id).await
    }

    /// Record a repayment against a debt.
    ///
    /// Composes a repayment create with the corresponding debt balance
    /// update. The two legs follow the write-or-queue contract
    /// independently, so one may sync while the other is queued - an
    /// accepted eventual-consistency window, not a transaction.
    pub async fn record_repayment(
        &self,
        debt_id: &str,
        debt: &Debt,
        amount_minor: i64,
        notes: Option<String>,
    ) -> Result<RepaymentOutcome> {
        if amount_minor <= 0 {
            return Err(Error::InvalidInput(
                "repayment amount must be positive".to_string(),
            ));
        }

        let previous_balance = debt.remaining_minor;
        let new_balance = (previous_balance - amount_minor).max(0);
        let now = Utc::now();
        let repayment = Repayment {
            user_id: debt.owner_id.clone(),
            debt_id: debt_id.to_string(),
            amount_minor,
            date: now,
            notes,
            previous_balance_minor: previous_balance,
            new_balance_minor: new_balance,
            created_at: now,
        };

        let repayment_outcome = create_or_queue(
            self.remote.as_ref(),
            &self.queue,
            collections::REPAYMENTS,
            document_fields(&repayment)?,
        )
        .await?;

        let mut patch = Map::new();
        patch.insert("remaining_minor".to_string(), new_balance.into());
        patch.insert(
            "status".to_string(),
            serde_json::to_value(DebtStatus::from_balance(debt.amount_minor, new_balance))?,
        );
        let debt_outcome = update_or_queue(
            self.remote.as_ref(),
            &self.queue,
            collections::DEBTS,
            debt_id,
            patch,
        )
        .await?;

        Ok(RepaymentOutcome {
            repayment: repayment_outcome,
            debt_update: debt_outcome,
        })
    }
}
