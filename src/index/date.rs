//! Date-bucketed transaction index.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{Transaction, TransactionId};

/// Ids booked on one day.
type DayBucket = BTreeSet<TransactionId>;
/// Day of month → ids.
type MonthBuckets = BTreeMap<u32, Arc<DayBucket>>;
/// Zero-based month → days.
type YearBuckets = BTreeMap<u32, Arc<MonthBuckets>>;

/// `year → month (0-based) → day → {id}` index over transactions.
///
/// Buckets are shared between clones and copied on write, so snapshots
/// taken before a Commit are cheap. Empty buckets are pruned upward
/// (day, then month, then year) so the structure only ever contains
/// non-empty paths, which makes incremental maintenance and a fresh
/// rebuild produce identical values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateIndex {
    /// Year → months.
    years: BTreeMap<i32, Arc<YearBuckets>>,
}

impl DateIndex {
    /// Builds an index from scratch.
    #[inline]
    #[must_use]
    pub fn from_transactions<'item, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'item Transaction>,
    {
        let mut index = Self::default();
        index.set_transactions(transactions);
        index
    }

    /// Replaces the whole index with the given transactions.
    #[inline]
    pub fn set_transactions<'item, I>(&mut self, transactions: I)
    where
        I: IntoIterator<Item = &'item Transaction>,
    {
        self.years.clear();
        for transaction in transactions {
            let _inserted = self.add(&transaction.id, transaction.date);
        }
    }

    /// Inserts `id` into the bucket for `date`.
    ///
    /// Returns `false` if the id was already there.
    #[inline]
    pub fn add(&mut self, id: &TransactionId, date: NaiveDate) -> bool {
        if self.contains(id, date) {
            return false;
        }
        let months = Arc::make_mut(self.years.entry(date.year()).or_default());
        let days = Arc::make_mut(months.entry(date.month0()).or_default());
        let ids = Arc::make_mut(days.entry(date.day()).or_default());
        ids.insert(id.clone())
    }

    /// Removes `id` from the bucket for `date`, pruning empty levels.
    ///
    /// Returns `false` if the id was not in that bucket.
    pub fn remove(&mut self, id: &TransactionId, date: NaiveDate) -> bool {
        if !self.contains(id, date) {
            return false;
        }
        let (year, month, day) = (date.year(), date.month0(), date.day());
        let Some(months_arc) = self.years.get_mut(&year) else {
            return false;
        };
        let months = Arc::make_mut(months_arc);
        let Some(days_arc) = months.get_mut(&month) else {
            return false;
        };
        let days = Arc::make_mut(days_arc);
        let Some(ids_arc) = days.get_mut(&day) else {
            return false;
        };
        let ids = Arc::make_mut(ids_arc);
        let removed = ids.remove(id);
        let day_empty = ids.is_empty();
        if day_empty {
            let _bucket = days.remove(&day);
        }
        let month_empty = days.is_empty();
        if month_empty {
            let _bucket = months.remove(&month);
        }
        if months.is_empty() {
            let _bucket = self.years.remove(&year);
        }
        removed
    }

    /// Moves a transaction from its old bucket to its new one.
    ///
    /// `old` is the before-state supplied by the caller, so the prior
    /// bucket is located directly rather than by scanning.
    #[inline]
    pub fn update(&mut self, old: &Transaction, new: &Transaction) {
        if old.id == new.id && old.date == new.date {
            return;
        }
        let _removed = self.remove(&old.id, old.date);
        let _inserted = self.add(&new.id, new.date);
    }

    /// Returns `true` if `id` is in the bucket for `date`.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &TransactionId, date: NaiveDate) -> bool {
        self.years
            .get(&date.year())
            .and_then(|months| months.get(&date.month0()))
            .and_then(|days| days.get(&date.day()))
            .is_some_and(|ids| ids.contains(id))
    }

    /// Returns the ids booked in `[from, to]`, oldest first.
    #[must_use]
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> Vec<TransactionId> {
        let mut found = Vec::new();
        if from > to {
            return found;
        }
        for (&year, months) in self.years.range(from.year()..=to.year()) {
            for (&month, days) in months.iter() {
                for (&day, ids) in days.iter() {
                    let Some(date) = NaiveDate::from_ymd_opt(year, month + 1, day) else {
                        continue;
                    };
                    if date >= from && date <= to {
                        found.extend(ids.iter().cloned());
                    }
                }
            }
        }
        found
    }

    /// Returns the total number of indexed ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.years
            .values()
            .flat_map(|months| months.values())
            .flat_map(|days| days.values())
            .map(|ids| ids.len())
            .sum()
    }

    /// Returns `true` if nothing is indexed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, TransactionType};

    fn tx(id: &str, year: i32, month: u32, day: u32) -> Transaction {
        Transaction {
            id: TransactionId::from(id),
            amount: 100,
            date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            description: "Lunch".to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("a"),
            debit_account_id: AccountId::from("b"),
            recurring_transaction_id: None,
        }
    }

    #[test]
    fn buckets_use_zero_based_months() {
        let mut index = DateIndex::default();
        let first = tx("t1", 2024, 1, 15);
        assert!(index.add(&first.id, first.date));
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["2024"]["0"]["15"][0], "t1");
    }

    #[test]
    fn add_is_idempotent() {
        let mut index = DateIndex::default();
        let first = tx("t1", 2024, 1, 15);
        assert!(index.add(&first.id, first.date));
        assert!(!index.add(&first.id, first.date));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_prunes_empty_levels() {
        let mut index = DateIndex::default();
        let first = tx("t1", 2024, 1, 15);
        let _inserted = index.add(&first.id, first.date);
        assert!(index.remove(&first.id, first.date));
        assert!(index.is_empty());
        assert_eq!(index, DateIndex::default());
    }

    #[test]
    fn remove_keeps_siblings() {
        let mut index = DateIndex::default();
        let first = tx("t1", 2024, 1, 15);
        let second = tx("t2", 2024, 1, 15);
        let _inserted = index.add(&first.id, first.date);
        let _inserted = index.add(&second.id, second.date);
        assert!(index.remove(&first.id, first.date));
        assert!(index.contains(&second.id, second.date));
        assert!(!index.remove(&first.id, first.date));
    }

    #[test]
    fn update_moves_between_buckets() {
        let mut index = DateIndex::default();
        let old = tx("t1", 2023, 12, 31);
        let new = tx("t1", 2024, 2, 1);
        let _inserted = index.add(&old.id, old.date);
        index.update(&old, &new);
        assert!(!index.contains(&old.id, old.date));
        assert!(index.contains(&new.id, new.date));
        assert_eq!(index, DateIndex::from_transactions([&new]));
    }

    #[test]
    fn between_is_inclusive_and_ordered() {
        let items = [
            tx("t3", 2024, 3, 1),
            tx("t1", 2024, 1, 1),
            tx("t2", 2024, 2, 10),
            tx("t0", 2023, 12, 31),
        ];
        let index = DateIndex::from_transactions(&items);
        let ids = index.between(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
        );
        assert_eq!(ids, vec![TransactionId::from("t1"), TransactionId::from("t2")]);
    }

    #[test]
    fn clones_share_until_written() {
        let mut index = DateIndex::default();
        let first = tx("t1", 2024, 1, 15);
        let _inserted = index.add(&first.id, first.date);
        let snapshot = index.clone();
        let second = tx("t2", 2024, 1, 16);
        let _inserted = index.add(&second.id, second.date);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(index.len(), 2);
    }
}
