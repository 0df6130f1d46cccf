//! Ledger account model.

use serde::{Deserialize, Serialize};

use super::{AccountId, AccountType, TransactionId};

/// A ledger account (checking account, credit card, salary, groceries).
///
/// The balance is never stored: it is derived from the opening balance
/// and the account's member transactions on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Display name.
    pub name: String,
    /// Type of account.
    #[serde(rename = "type")]
    pub kind: AccountType,
    /// Balance before any recorded transaction, in minor currency units.
    pub opening_balance: i64,
}

impl Account {
    /// Creates an account with a fresh random identifier.
    #[inline]
    #[must_use]
    pub fn new<N: Into<String>>(name: N, kind: AccountType, opening_balance: i64) -> Self {
        Self {
            id: AccountId::random(),
            name: name.into(),
            kind,
            opening_balance,
        }
    }
}

/// An account populated with derived data for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    /// The stored account.
    #[serde(flatten)]
    pub account: Account,
    /// Computed balance in minor currency units.
    pub balance: i64,
    /// Member transactions, ordered by id.
    pub transaction_ids: Vec<TransactionId>,
}
