//! Transaction model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{AccountId, AccountType, RecurringTransactionId, TransactionId, TransactionType};

/// A concrete double-entry transaction moving `amount` out of the credit
/// account into the debit account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Amount in minor currency units, never negative.
    pub amount: i64,
    /// Booking date.
    pub date: NaiveDate,
    /// Free-text description, indexed for search.
    pub description: String,
    /// Transaction type.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Account the money leaves.
    pub credit_account_id: AccountId,
    /// Account the money enters.
    pub debit_account_id: AccountId,
    /// Recurring definition this transaction was realized from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_transaction_id: Option<RecurringTransactionId>,
}

impl Transaction {
    /// Returns both referenced accounts, credit side first.
    #[inline]
    #[must_use]
    pub const fn accounts(&self) -> [&AccountId; 2] {
        [&self.credit_account_id, &self.debit_account_id]
    }

    /// Returns `true` if either side references `account`.
    #[inline]
    #[must_use]
    pub fn touches(&self, account: &AccountId) -> bool {
        self.credit_account_id == *account || self.debit_account_id == *account
    }

    /// Returns the signed effect of this transaction on the balance of
    /// `account`, given that account's type.
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

/// Computes the balance effect of a movement from `credit` to `debit` on
/// `account`.
pub(crate) fn signed_amount(
    amount: i64,
    credit: &AccountId,
    debit: &AccountId,
    account: &AccountId,
    kind: AccountType,
) -> i64 {
    let debited = if debit == account { amount } else { 0 };
    let credited = if credit == account { amount } else { 0 };
    if kind.is_debit_normal() {
        debited - credited
    } else {
        credited - debited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coffee() -> Transaction {
        Transaction {
            id: TransactionId::from("t1"),
            amount: 500,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: "Coffee".to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("checking"),
            debit_account_id: AccountId::from("food"),
            recurring_transaction_id: None,
        }
    }

    #[test]
    fn deserialize_transaction() {
        let json = r#"{
            "id": "t1",
            "amount": 500,
            "date": "2024-03-01",
            "description": "Coffee",
            "type": "expense",
            "creditAccountId": "checking",
            "debitAccountId": "food"
        }"#;
        let transaction: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(transaction, coffee());
    }

    #[test]
    fn recurring_link_is_omitted_when_absent() {
        let value = serde_json::to_value(coffee()).unwrap();
        assert!(value.get("recurringTransactionId").is_none());
    }

    #[test]
    fn signed_amount_by_normal_side() {
        let transaction = coffee();
        assert_eq!(
            transaction.signed_amount(&AccountId::from("checking"), AccountType::Asset),
            -500
        );
        assert_eq!(
            transaction.signed_amount(&AccountId::from("food"), AccountType::Expense),
            500
        );
        assert_eq!(
            transaction.signed_amount(&AccountId::from("card"), AccountType::Liability),
            0
        );
    }

    #[test]
    fn paying_with_credit_card_raises_liability() {
        let mut transaction = coffee();
        transaction.credit_account_id = AccountId::from("card");
        assert_eq!(
            transaction.signed_amount(&AccountId::from("card"), AccountType::Liability),
            500
        );
    }
}
