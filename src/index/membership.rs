//! Account → transaction membership index.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;

use crate::models::{AccountId, Transaction, TransactionId};

/// For every known account, the ids of transactions that reference it on
/// either side.
///
/// Lists are ordered sets, so registering an id twice is a no-op and the
/// structure is identical no matter the order of maintenance calls.
/// Registering against an account the index does not know is silently
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipIndex {
    /// Account → member transaction ids.
    accounts: BTreeMap<AccountId, Arc<BTreeSet<TransactionId>>>,
}

impl MembershipIndex {
    /// Builds an index from scratch.
    #[must_use]
    pub fn build<'item, A, T>(accounts: A, transactions: T) -> Self
    where
        A: IntoIterator<Item = &'item AccountId>,
        T: IntoIterator<Item = &'item Transaction>,
    {
        let mut index = Self {
            accounts: accounts
                .into_iter()
                .map(|id| (id.clone(), Arc::default()))
                .collect(),
        };
        for transaction in transactions {
            index.register(transaction);
        }
        index
    }

    /// Starts tracking an account, registering any existing transactions
    /// that already reference it.
    pub fn add_account<'item, T>(&mut self, account: &AccountId, transactions: T)
    where
        T: IntoIterator<Item = &'item Transaction>,
    {
        let members: BTreeSet<TransactionId> = transactions
            .into_iter()
            .filter(|item| item.touches(account))
            .map(|item| item.id.clone())
            .collect();
        let _old = self.accounts.insert(account.clone(), Arc::new(members));
    }

    /// Stops tracking an account.
    #[inline]
    pub fn remove_account(&mut self, account: &AccountId) {
        let _old = self.accounts.remove(account);
    }

    /// Registers a transaction under both of its accounts.
    pub fn register(&mut self, transaction: &Transaction) {
        for account in transaction.accounts() {
            if let Some(members) = self.accounts.get_mut(account)
                && !members.contains(&transaction.id)
            {
                let _inserted = Arc::make_mut(members).insert(transaction.id.clone());
            }
        }
    }

    /// Removes a transaction from both of its accounts.
    pub fn deregister(&mut self, transaction: &Transaction) {
        for account in transaction.accounts() {
            if let Some(members) = self.accounts.get_mut(account)
                && members.contains(&transaction.id)
            {
                let _removed = Arc::make_mut(members).remove(&transaction.id);
            }
        }
    }

    /// Swaps registrations when a transaction's accounts change.
    #[inline]
    pub fn update(&mut self, old: &Transaction, new: &Transaction) {
        if old.id == new.id && old.accounts() == new.accounts() {
            return;
        }
        self.deregister(old);
        self.register(new);
    }

    /// Returns the members of an account, or `None` if it is unknown.
    #[inline]
    #[must_use]
    pub fn transactions_of(&self, account: &AccountId) -> Option<&BTreeSet<TransactionId>> {
        self.accounts.get(account).map(Arc::as_ref)
    }

    /// Returns `true` if `transaction` is a member of `account`.
    #[inline]
    #[must_use]
    pub fn contains(&self, account: &AccountId, transaction: &TransactionId) -> bool {
        self.accounts
            .get(account)
            .is_some_and(|members| members.contains(transaction))
    }
}
