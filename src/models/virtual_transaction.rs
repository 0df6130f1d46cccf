//! Projected future transactions.

use chrono::NaiveDate;
use serde::Serialize;

use super::{AccountId, AccountType, RecurringTransactionId, TransactionType};
use crate::models::transaction::signed_amount;

/// A transaction-shaped projection of a recurring transaction on one
/// date.
///
/// Lives only in the projector; never persisted, synced or backed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualTransaction {
    /// Synthetic identifier, `virtual-{recurring id}-{date}`.
    pub id: String,
    /// Definition this projection came from.
    pub recurring_transaction_id: RecurringTransactionId,
    /// Amount in minor currency units.
    pub amount: i64,
    /// Projected date.
    pub date: NaiveDate,
    /// Description.
    pub description: String,
    /// Transaction type.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Account the money leaves.
    pub credit_account_id: AccountId,
    /// Account the money enters.
    pub debit_account_id: AccountId,
}

impl VirtualTransaction {
    /// Builds the synthetic id for a recurring transaction and date.
    #[inline]
    #[must_use]
    pub fn synthetic_id(recurring: &RecurringTransactionId, date: NaiveDate) -> String {
        format!("virtual-{recurring}-{date}")
    }

    /// Returns the signed effect of this projection on `account`.
    #[inline]
    #[must_use]
    pub fn signed_amount(&self, account: &AccountId, kind: AccountType) -> i64 {
        signed_amount(
            self.amount,
            &self.credit_account_id,
            &self.debit_account_id,
            account,
            kind,
        )
    }
}
