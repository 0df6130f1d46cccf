//! The normalized entity store.
//!
//! One [`Collection`] per resource. The store is the single source of
//! truth: every derived structure in [`crate::index`] and
//! [`crate::projection`] is a function of its contents.

mod collection;

pub use collection::Collection;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{
    Account, Entity, ImportProfile, ImportProfileId, ImportProfileMapping, ImportRule,
    ImportRuleAction, ImportRuleCondition, ImportRuleId, Preference, RecurringTransaction,
    RecurringTransactionId, Transaction,
};

/// Per-resource normalized maps.
///
/// Serializes as one `id → entity` object per resource; missing
/// resources deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntityStore {
    /// Accounts.
    pub accounts: Collection<Account>,
    /// Concrete transactions.
    pub transactions: Collection<Transaction>,
    /// Recurring transaction definitions.
    pub recurring_transactions: Collection<RecurringTransaction>,
    /// Import rules.
    pub import_rules: Collection<ImportRule>,
    /// Actions owned by import rules.
    pub import_rule_actions: Collection<ImportRuleAction>,
    /// Conditions owned by import rules.
    pub import_rule_conditions: Collection<ImportRuleCondition>,
    /// Import profiles.
    pub import_profiles: Collection<ImportProfile>,
    /// Mappings owned by import profiles.
    pub import_profile_mappings: Collection<ImportProfileMapping>,
    /// Preferences.
    pub preferences: Collection<Preference>,
}

impl EntityStore {
    /// Returns transactions realized from a recurring definition.
    #[inline]
    pub fn linked_transactions<'store>(
        &'store self,
        recurring: &'store RecurringTransactionId,
    ) -> impl Iterator<Item = &'store Transaction> + 'store {
        self.transactions
            .values()
            .filter(move |item| item.recurring_transaction_id.as_ref() == Some(recurring))
    }

    /// Returns `true` if a transaction for `(recurring, date)` exists.
    #[inline]
    #[must_use]
    pub fn is_realized(&self, recurring: &RecurringTransactionId, date: NaiveDate) -> bool {
        self.linked_transactions(recurring)
            .any(|item| item.date == date)
    }

    /// Returns the actions owned by a rule.
    #[inline]
    pub fn rule_actions<'store>(
        &'store self,
        rule: &'store ImportRuleId,
    ) -> impl Iterator<Item = &'store ImportRuleAction> + 'store {
        self.import_rule_actions
            .values()
            .filter(move |item| item.import_rule_id == *rule)
    }

    /// Returns the conditions owned by a rule.
    #[inline]
    pub fn rule_conditions<'store>(
        &'store self,
        rule: &'store ImportRuleId,
    ) -> impl Iterator<Item = &'store ImportRuleCondition> + 'store {
        self.import_rule_conditions
            .values()
            .filter(move |item| item.import_rule_id == *rule)
    }

    /// Returns the mappings owned by a profile.
    #[inline]
    pub fn profile_mappings<'store>(
        &'store self,
        profile: &'store ImportProfileId,
    ) -> impl Iterator<Item = &'store ImportProfileMapping> + 'store {
        self.import_profile_mappings
            .values()
            .filter(move |item| item.import_profile_id == *profile)
    }

    /// Looks up a preference by key.
    #[inline]
    #[must_use]
    pub fn preference(&self, key: &str) -> Option<&Preference> {
        self.preferences.values().find(|item| item.key == key)
    }
}

/// Maps an entity type to its collection inside the [`EntityStore`].
pub trait Stored: Entity {
    /// Returns the collection holding this entity type.
    fn collection(store: &EntityStore) -> &Collection<Self>;

    /// Returns the collection holding this entity type, mutably.
    fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self>;
}

/// Implements [`Stored`] for each `Type => field` pair.
macro_rules! impl_stored {
    ($($ty:ty => $field:ident;)+) => {
        $(
            impl Stored for $ty {
                #[inline]
                fn collection(store: &EntityStore) -> &Collection<Self> {
                    &store.$field
                }

                #[inline]
                fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self> {
                    &mut store.$field
                }
            }
        )+
    };
}

impl_stored! {
    Account => accounts;
    Transaction => transactions;
    RecurringTransaction => recurring_transactions;
    ImportRule => import_rules;
    ImportRuleAction => import_rule_actions;
    ImportRuleCondition => import_rule_conditions;
    ImportProfile => import_profiles;
    ImportProfileMapping => import_profile_mappings;
    Preference => preferences;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, TransactionId, TransactionType};

    fn linked(id: &str, day: u32) -> Transaction {
        Transaction {
            id: TransactionId::from(id),
            amount: 100,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            description: "Rent".to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("a"),
            debit_account_id: AccountId::from("b"),
            recurring_transaction_id: Some(RecurringTransactionId::from("r1")),
        }
    }

    #[test]
    fn realized_lookup_uses_link_and_date() {
        let mut store = EntityStore::default();
        let _old = Transaction::collection_mut(&mut store).add(linked("t1", 5));
        let rid = RecurringTransactionId::from("r1");
        assert!(store.is_realized(&rid, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()));
        assert!(!store.is_realized(&rid, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()));
        assert!(!store.is_realized(
            &RecurringTransactionId::from("r2"),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        ));
    }

    #[test]
    fn preference_by_key() {
        let mut store = EntityStore::default();
        let _old = store.preferences.add(Preference {
            id: crate::models::PreferenceId::from("p1"),
            key: "theme".to_owned(),
            value: "dark".to_owned(),
        });
        assert_eq!(store.preference("theme").unwrap().value, "dark");
        assert!(store.preference("locale").is_none());
    }
}
