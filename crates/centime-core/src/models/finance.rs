//! Domain entity models: transactions, debts, repayments
//!
//! These are write payloads and merge-view projections. Document identity is
//! not part of the model; the remote store assigns ids and returns them in
//! [`crate::remote::Document`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a financial transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    Debt,
    Repayment,
}

/// Direction of a debt relative to the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtDirection {
    /// They owe me
    Owed,
    /// I owe them
    Owing,
}

/// Repayment progress of a debt, derived from the remaining balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Pending,
    Partial,
    Paid,
}

impl DebtStatus {
    /// Derive the status from the original amount and the remaining balance.
    #[must_use]
    pub const fn from_balance(amount_minor: i64, remaining_minor: i64) -> Self {
        if remaining_minor <= 0 {
            Self::Paid
        } else if remaining_minor < amount_minor {
            Self::Partial
        } else {
            Self::Pending
        }
    }
}

/// A single income/expense/debt/repayment entry
///
/// Amounts are stored in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub user_id: String,
    pub amount_minor: i64,
    pub kind: TransactionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<DebtDirection>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a transaction dated now with no optional detail.
    #[must_use]
    pub fn new(user_id: impl Into<String>, kind: TransactionKind, amount_minor: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            amount_minor,
            kind,
            category: None,
            date: now,
            notes: None,
            counterparty_name: None,
            debt_id: None,
            direction: None,
            created_at: now,
        }
    }
}

/// A debt owed to or by the owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub owner_id: String,
    pub counterparty_name: String,
    /// Original debt amount
    pub amount_minor: i64,
    /// Remaining balance after repayments
    pub remaining_minor: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub direction: DebtDirection,
    pub status: DebtStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Debt {
    /// Create a fresh, unpaid debt.
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        counterparty_name: impl Into<String>,
        amount_minor: i64,
        direction: DebtDirection,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            counterparty_name: counterparty_name.into(),
            amount_minor,
            remaining_minor: amount_minor,
            currency: None,
            direction,
            status: DebtStatus::Pending,
            due_date: None,
            notes: None,
            created_at: Utc::now(),
        }
    }
}

/// One payment recorded against a debt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repayment {
    pub user_id: String,
    pub debt_id: String,
    pub amount_minor: i64,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Debt balance before this repayment
    pub previous_balance_minor: i64,
    /// Debt balance after this repayment
    pub new_balance_minor: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn debt_status_follows_remaining_balance() {
        assert_eq!(DebtStatus::from_balance(100, 100), DebtStatus::Pending);
        assert_eq!(DebtStatus::from_balance(100, 40), DebtStatus::Partial);
        assert_eq!(DebtStatus::from_balance(100, 0), DebtStatus::Paid);
        assert_eq!(DebtStatus::from_balance(100, -5), DebtStatus::Paid);
    }

    #[test]
    fn new_debt_starts_pending_with_full_balance() {
        let debt = Debt::new("user_1", "Amina", 12_050, DebtDirection::Owed);
        assert_eq!(debt.remaining_minor, debt.amount_minor);
        assert_eq!(debt.status, DebtStatus::Pending);
    }

    #[test]
    fn transaction_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TransactionKind::Expense).unwrap(),
            json!("expense")
        );
        assert_eq!(
            serde_json::to_value(DebtDirection::Owing).unwrap(),
            json!("owing")
        );
    }

    #[test]
    fn transaction_omits_unset_optional_fields() {
        let tx = Transaction::new("user_1", TransactionKind::Expense, 5000);
        let value = serde_json::to_value(&tx).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("category"));
        assert!(!object.contains_key("debt_id"));
        assert_eq!(object.get("kind"), Some(&json!("expense")));
    }
}
