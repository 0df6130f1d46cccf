//! Derived index maintenance.
//!
//! Three secondary structures are kept in lockstep with the transaction
//! collection of the [`crate::store::EntityStore`]:
//!
//! - [`DateIndex`]: `year → month → day → {id}` for range queries,
//! - [`TextIndex`]: bigram/word maps for description search,
//! - [`MembershipIndex`]: account → transaction ids for balances.
//!
//! The hooks on [`DerivedIndexes`] are invoked synchronously from the
//! Commit (and Rollback) of every mutation touching transactions or
//! accounts. Each structure can also be rebuilt from scratch, and a
//! rebuild equals the result of incremental maintenance over the same
//! input.

mod date;
mod membership;
mod text;

pub use date::DateIndex;
pub use membership::MembershipIndex;
pub use text::{TextIndex, bigram, normalize};

use crate::models::{AccountId, Transaction};
use crate::store::EntityStore;

/// All derived indexes over the entity store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedIndexes {
    /// Date buckets.
    pub date: DateIndex,
    /// Text search maps.
    pub text: TextIndex,
    /// Account membership lists.
    pub membership: MembershipIndex,
}

impl DerivedIndexes {
    /// Builds every index from the current store contents.
    #[must_use]
    pub fn build(store: &EntityStore) -> Self {
        let mut indexes = Self::default();
        indexes.on_replace_all(store);
        indexes
    }

    /// A transaction entered the store.
    pub fn on_create(&mut self, transaction: &Transaction) {
        tracing::trace!(id = %transaction.id, "indexing transaction");
        let _inserted = self.date.add(&transaction.id, transaction.date);
        self.text.add(&transaction.id, &transaction.description);
        self.membership.register(transaction);
    }

    /// A stored transaction was replaced; `old` is its before-state.
    pub fn on_update(&mut self, old: &Transaction, new: &Transaction) {
        tracing::trace!(id = %new.id, "re-indexing transaction");
        self.date.update(old, new);
        self.text.update(old, new);
        self.membership.update(old, new);
    }

    /// A transaction left the store.
    pub fn on_delete(&mut self, transaction: &Transaction) {
        tracing::trace!(id = %transaction.id, "dropping transaction from indexes");
        let _removed = self.date.remove(&transaction.id, transaction.date);
        self.text.remove(&transaction.id, &transaction.description);
        self.membership.deregister(transaction);
    }

    /// The store was replaced wholesale.
    pub fn on_replace_all(&mut self, store: &EntityStore) {
        tracing::debug!(
            transactions = store.transactions.len(),
            accounts = store.accounts.len(),
            "rebuilding derived indexes"
        );
        self.date.set_transactions(store.transactions.values());
        self.text.set_transactions(store.transactions.values());
        self.membership = MembershipIndex::build(
            store.accounts.values().map(|account| &account.id),
            store.transactions.values(),
        );
    }

    /// An account entered the store.
    #[inline]
    pub fn on_account_create(&mut self, account: &AccountId, store: &EntityStore) {
        self.membership
            .add_account(account, store.transactions.values());
    }

    /// An account left the store.
    #[inline]
    pub fn on_account_delete(&mut self, account: &AccountId) {
        self.membership.remove_account(account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, AccountType, NaiveDate, TransactionId, TransactionType};

    fn store_with_accounts() -> EntityStore {
        let mut store = EntityStore::default();
        for (id, kind) in [("checking", AccountType::Asset), ("food", AccountType::Expense)] {
            let _old = store.accounts.add(Account {
                id: AccountId::from(id),
                name: id.to_owned(),
                kind,
                opening_balance: 0,
            });
        }
        store
    }

    fn tx(id: &str, day: u32, description: &str) -> Transaction {
        Transaction {
            id: TransactionId::from(id),
            amount: 250,
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            description: description.to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("checking"),
            debit_account_id: AccountId::from("food"),
            recurring_transaction_id: None,
        }
    }

    #[test]
    fn incremental_equals_rebuild() {
        let mut store = store_with_accounts();
        let mut incremental = DerivedIndexes::build(&store);
        for item in [
            tx("t1", 1, "Coffee"),
            tx("t2", 1, "Corner shop"),
            tx("t3", 9, "Weekly groceries"),
        ] {
            incremental.on_create(&item);
            let _old = store.transactions.add(item);
        }
        assert_eq!(incremental, DerivedIndexes::build(&store));
    }

    #[test]
    fn create_then_delete_restores_exactly() {
        let store = store_with_accounts();
        let before = DerivedIndexes::build(&store);
        let mut indexes = before.clone();
        let coffee = tx("t1", 3, "Coffee");
        indexes.on_create(&coffee);
        assert_ne!(indexes, before);
        indexes.on_delete(&coffee);
        assert_eq!(indexes, before);
    }

    #[test]
    fn update_then_reverse_restores_exactly() {
        let mut store = store_with_accounts();
        let old = tx("t1", 3, "Coffee");
        let _old = store.transactions.add(old.clone());
        let before = DerivedIndexes::build(&store);
        let mut indexes = before.clone();
        let new = tx("t1", 20, "Tea and cake");
        indexes.on_update(&old, &new);
        indexes.on_update(&new, &old);
        assert_eq!(indexes, before);
    }

    #[test]
    fn account_hooks_track_membership() {
        let mut store = store_with_accounts();
        let item = tx("t1", 3, "Coffee");
        let _old = store.transactions.add(item.clone());
        let mut indexes = DerivedIndexes::build(&store);
        indexes.on_account_delete(&AccountId::from("food"));
        assert!(indexes.membership.transactions_of(&AccountId::from("food")).is_none());
        indexes.on_account_create(&AccountId::from("food"), &store);
        assert_eq!(indexes, DerivedIndexes::build(&store));
    }
}
