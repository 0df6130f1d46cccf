//! Recurring transaction definitions.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::{
    AccountId, Frequency, RecurringTransactionId, Transaction, TransactionId, TransactionType,
    VirtualTransaction,
};

/// Which day inside a period an occurrence falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Anchor {
    /// A fixed weekday (weekly rules).
    Weekday {
        /// Day of the week.
        weekday: Weekday,
    },
    /// A fixed day of the month, clamped to the month's length (monthly
    /// rules).
    DayOfMonth {
        /// Day number, `1..=31`.
        day: u32,
    },
    /// The last day of every month (monthly rules).
    LastDayOfMonth,
}

/// When a recurrence stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RecurrenceEnd {
    /// Never ends.
    #[default]
    Never,
    /// Ends on this date (inclusive).
    On {
        /// Last allowed occurrence date.
        date: NaiveDate,
    },
    /// Ends after this many occurrences.
    After {
        /// Total occurrence count, at least one.
        count: u32,
    },
}

/// A recurrence rule: every `interval` `frequency` units starting at
/// `start_date`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    /// Step size in `frequency` units, at least one.
    pub interval: u32,
    /// Step unit.
    pub frequency: Frequency,
    /// Optional day anchor inside each period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    /// First possible occurrence date.
    pub start_date: NaiveDate,
    /// End condition.
    #[serde(default)]
    pub end: RecurrenceEnd,
}

/// A template that materializes into one concrete transaction per
/// occurrence of its recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTransaction {
    /// Unique identifier.
    pub id: RecurringTransactionId,
    /// Amount per occurrence, in minor currency units.
    pub amount: i64,
    /// Description copied to each occurrence.
    pub description: String,
    /// Transaction type of each occurrence.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Account the money leaves.
    pub credit_account_id: AccountId,
    /// Account the money enters.
    pub debit_account_id: AccountId,
    /// Schedule.
    pub recurrence: RecurrenceRule,
    /// Latest date up to which occurrences have been materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_realized_date: Option<NaiveDate>,
}

impl RecurringTransaction {
    /// Builds the concrete transaction for the occurrence on `date`.
    #[inline]
    #[must_use]
    pub fn realize(&self, date: NaiveDate) -> Transaction {
        Transaction {
            id: TransactionId::random(),
            amount: self.amount,
            date,
            description: self.description.clone(),
            kind: self.kind,
            credit_account_id: self.credit_account_id.clone(),
            debit_account_id: self.debit_account_id.clone(),
            recurring_transaction_id: Some(self.id.clone()),
        }
    }

    /// Builds the projected (never persisted) instance for `date`.
    #[inline]
    #[must_use]
    pub fn project(&self, date: NaiveDate) -> VirtualTransaction {
        VirtualTransaction {
            id: VirtualTransaction::synthetic_id(&self.id, date),
            recurring_transaction_id: self.id.clone(),
            amount: self.amount,
            date,
            description: self.description.clone(),
            kind: self.kind,
            credit_account_id: self.credit_account_id.clone(),
            debit_account_id: self.debit_account_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_monthly_rule() {
        let json = r#"{
            "id": "r1",
            "amount": 120000,
            "description": "Rent",
            "type": "expense",
            "creditAccountId": "checking",
            "debitAccountId": "rent",
            "recurrence": {
                "interval": 1,
                "frequency": "month",
                "anchor": { "kind": "lastDayOfMonth" },
                "startDate": "2024-01-31",
                "end": { "kind": "after", "count": 12 }
            }
        }"#;
        let recurring: RecurringTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(recurring.recurrence.anchor, Some(Anchor::LastDayOfMonth));
        assert_eq!(recurring.recurrence.end, RecurrenceEnd::After { count: 12 });
        assert!(recurring.last_realized_date.is_none());
    }

    #[test]
    fn end_defaults_to_never() {
        let json = r#"{ "interval": 2, "frequency": "week", "startDate": "2024-01-01" }"#;
        let rule: RecurrenceRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.end, RecurrenceEnd::Never);
        assert!(rule.anchor.is_none());
    }

    #[test]
    fn realize_links_back() {
        let recurring = RecurringTransaction {
            id: RecurringTransactionId::from("r1"),
            amount: 900,
            description: "Gym".to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("checking"),
            debit_account_id: AccountId::from("fitness"),
            recurrence: RecurrenceRule {
                interval: 1,
                frequency: Frequency::Month,
                anchor: None,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                end: RecurrenceEnd::Never,
            },
            last_realized_date: None,
        };
        let date = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        let transaction = recurring.realize(date);
        assert_eq!(transaction.recurring_transaction_id, Some(recurring.id.clone()));
        assert_eq!(transaction.date, date);

        let projected = recurring.project(date);
        assert_eq!(projected.id, "virtual-r1-2024-02-05");
    }
}
