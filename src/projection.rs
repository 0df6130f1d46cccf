//! Virtual transaction projection.
//!
//! Expands recurring transactions into [`VirtualTransaction`]s up to a
//! horizon date. The window start is always unbounded so cumulative
//! projected balances stay correct. Dates already materialized, either
//! at or before the definition's `last_realized_date` watermark or by a
//! linked real transaction, are skipped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::{RecurringTransaction, RecurringTransactionId, VirtualTransaction};
use crate::store::EntityStore;

/// Upper bound on projected occurrences per recurring transaction.
pub const MAX_OCCURRENCES: usize = 10_000;

/// Holds the projected instances for the current window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projector {
    /// Inclusive end of the window; `None` until a window is requested.
    horizon: Option<NaiveDate>,
    /// Projections per recurring transaction, ordered by date.
    virtuals: BTreeMap<RecurringTransactionId, Vec<VirtualTransaction>>,
}

impl Projector {
    /// Returns the current window end.
    #[inline]
    #[must_use]
    pub const fn horizon(&self) -> Option<NaiveDate> {
        self.horizon
    }

    /// Regenerates every projection for the window ending at `until`.
    #[tracing::instrument(skip_all, fields(until = %until))]
    pub fn add_many(&mut self, until: NaiveDate, store: &EntityStore) {
        self.horizon = Some(until);
        self.virtuals = store
            .recurring_transactions
            .values()
            .map(|recurring| (recurring.id.clone(), generate(recurring, until, store)))
            .filter(|(_, items)| !items.is_empty())
            .collect();
        tracing::debug!(
            definitions = self.virtuals.len(),
            instances = self.len(),
            "projected recurring transactions"
        );
    }

    /// Regenerates the projections of one recurring transaction.
    ///
    /// No-op until a window has been requested.
    pub fn update(&mut self, recurring: &RecurringTransaction, store: &EntityStore) {
        let Some(until) = self.horizon else {
            return;
        };
        let items = generate(recurring, until, store);
        if items.is_empty() {
            let _old = self.virtuals.remove(&recurring.id);
        } else {
            let _old = self.virtuals.insert(recurring.id.clone(), items);
        }
    }

    /// Re-derives the projections of `id` from the store, dropping them
    /// if the definition no longer exists.
    #[inline]
    pub fn refresh(&mut self, id: &RecurringTransactionId, store: &EntityStore) {
        match store.recurring_transactions.get(id) {
            Some(recurring) => self.update(recurring, store),
            None => self.delete(id),
        }
    }

    /// Drops every projection of a recurring transaction.
    #[inline]
    pub fn delete(&mut self, id: &RecurringTransactionId) {
        let _old = self.virtuals.remove(id);
    }

    /// Drops all projections and forgets the window.
    #[inline]
    pub fn clear(&mut self) {
        self.horizon = None;
        self.virtuals.clear();
    }

    /// Returns the projections of one recurring transaction.
    #[inline]
    #[must_use]
    pub fn of(&self, id: &RecurringTransactionId) -> &[VirtualTransaction] {
        self.virtuals.get(id).map_or(&[], Vec::as_slice)
    }

    /// Returns every projection dated `<= until`, ordered by date then id.
    #[must_use]
    pub fn until(&self, until: NaiveDate) -> Vec<&VirtualTransaction> {
        let mut items: Vec<&VirtualTransaction> = self
            .virtuals
            .values()
            .flatten()
            .filter(|item| item.date <= until)
            .collect();
        items.sort_by(|left, right| {
            left.date
                .cmp(&right.date)
                .then_with(|| left.id.cmp(&right.id))
        });
        items
    }

    /// Returns every projection, ordered by date then id.
    #[inline]
    #[must_use]
    pub fn all(&self) -> Vec<&VirtualTransaction> {
        self.until(NaiveDate::MAX)
    }

    /// Returns the number of projected instances.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.virtuals.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is projected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.virtuals.is_empty()
    }
}

/// Expands one definition up to `until`.
///
/// Occurrences come from the trusted iterator: the definition passed
/// validation on Commit, and re-checking each generated date would make
/// long windows needlessly slow.
fn generate(
    recurring: &RecurringTransaction,
    until: NaiveDate,
    store: &EntityStore,
) -> Vec<VirtualTransaction> {
    let realized: BTreeSet<NaiveDate> = store
        .linked_transactions(&recurring.id)
        .map(|item| item.date)
        .collect();
    let watermark = recurring.last_realized_date;
    recurring
        .recurrence
        .occurrences_trusted()
        .take_while(|date| *date <= until)
        .skip_while(|date| watermark.is_some_and(|mark| *date <= mark))
        .take(MAX_OCCURRENCES)
        .filter(|date| !realized.contains(date))
        .map(|date| recurring.project(date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AccountId, Frequency, RecurrenceEnd, RecurrenceRule, Transaction, TransactionId,
        TransactionType,
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn recurring(id: &str, start: NaiveDate, frequency: Frequency) -> RecurringTransaction {
        RecurringTransaction {
            id: RecurringTransactionId::from(id),
            amount: 1_000,
            description: "Subscription".to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("checking"),
            debit_account_id: AccountId::from("media"),
            recurrence: RecurrenceRule {
                interval: 1,
                frequency,
                anchor: None,
                start_date: start,
                end: RecurrenceEnd::Never,
            },
            last_realized_date: None,
        }
    }

    #[test]
    fn window_start_is_unbounded_and_real_dates_skipped() {
        let mut store = EntityStore::default();
        let weekly = recurring("r1", date(2024, 1, 1), Frequency::Week);
        let monthly = recurring("r2", date(2024, 1, 1), Frequency::Month);
        let mut real = weekly.realize(date(2024, 1, 8));
        real.id = TransactionId::from("real");
        let _old = store.transactions.add(real);
        let _old = store.recurring_transactions.add(weekly);
        let _old = store.recurring_transactions.add(monthly);

        let mut projector = Projector::default();
        projector.add_many(date(2024, 1, 31), &store);

        let weekly_dates: Vec<NaiveDate> = projector
            .of(&RecurringTransactionId::from("r1"))
            .iter()
            .map(|item| item.date)
            .collect();
        assert_eq!(
            weekly_dates,
            vec![date(2024, 1, 1), date(2024, 1, 15), date(2024, 1, 22), date(2024, 1, 29)]
        );
        assert_eq!(projector.of(&RecurringTransactionId::from("r2")).len(), 1);
        assert_eq!(projector.until(date(2024, 1, 1)).len(), 2);
    }

    #[test]
    fn watermark_hides_realized_dates() {
        let mut store = EntityStore::default();
        let mut daily = recurring("r1", date(2024, 1, 1), Frequency::Day);
        daily.last_realized_date = Some(date(2024, 1, 3));
        let _old = store.recurring_transactions.add(daily);
        let mut projector = Projector::default();
        projector.add_many(date(2024, 1, 5), &store);
        let dates: Vec<NaiveDate> = projector.all().iter().map(|item| item.date).collect();
        assert_eq!(dates, vec![date(2024, 1, 4), date(2024, 1, 5)]);
    }

    #[test]
    fn update_and_delete_single_definition() {
        let mut store = EntityStore::default();
        let daily = recurring("r1", date(2024, 1, 1), Frequency::Day);
        let _old = store.recurring_transactions.add(daily.clone());
        let mut projector = Projector::default();
        projector.update(&daily, &store);
        assert!(projector.is_empty());

        projector.add_many(date(2024, 1, 3), &store);
        assert_eq!(projector.len(), 3);

        let mut shorter = daily.clone();
        shorter.recurrence.end = RecurrenceEnd::After { count: 1 };
        projector.update(&shorter, &store);
        assert_eq!(projector.len(), 1);

        projector.delete(&daily.id);
        assert!(projector.is_empty());
        assert_eq!(projector.horizon(), Some(date(2024, 1, 3)));
    }

    #[test]
    fn refresh_follows_store() {
        let mut store = EntityStore::default();
        let daily = recurring("r1", date(2024, 1, 1), Frequency::Day);
        let _old = store.recurring_transactions.add(daily.clone());
        let mut projector = Projector::default();
        projector.add_many(date(2024, 1, 2), &store);

        let linked = Transaction {
            id: TransactionId::from("t1"),
            ..daily.realize(date(2024, 1, 2))
        };
        let _old = store.transactions.add(linked);
        projector.refresh(&daily.id, &store);
        assert_eq!(projector.len(), 1);

        let _old = store.recurring_transactions.delete(&daily.id);
        projector.refresh(&daily.id, &store);
        assert!(projector.is_empty());
    }

    #[test]
    fn projection_is_capped() {
        let mut store = EntityStore::default();
        let _old = store
            .recurring_transactions
            .add(recurring("r1", date(2000, 1, 1), Frequency::Day));
        let mut projector = Projector::default();
        projector.add_many(date(2100, 1, 1), &store);
        assert_eq!(projector.len(), MAX_OCCURRENCES);
    }

    #[test]
    fn cap_counts_only_dates_after_the_watermark() {
        let mut store = EntityStore::default();
        let mut daily = recurring("r1", date(1996, 1, 1), Frequency::Day);
        daily.last_realized_date = Some(date(2026, 10, 1));
        let _old = store.recurring_transactions.add(daily);
        let mut projector = Projector::default();
        projector.add_many(date(2026, 10, 31), &store);
        assert_eq!(projector.len(), 30);
        assert_eq!(
            projector.all().first().map(|item| item.date),
            Some(date(2026, 10, 2))
        );
    }
}
