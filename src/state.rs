//! The unit a Commit mutates: entity store plus everything derived from
//! it.
//!
//! [`LedgerState::insert`] and [`LedgerState::remove`] are the only
//! mutators mutations use. Each one updates the primary collection and
//! then fires the entity's [`Tracked`] hooks so the date, text and
//! membership indexes and the projector follow in the same step.

use alloc::sync::Arc;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::index::DerivedIndexes;
use crate::models::{
    Account, AccountId, AccountView, Entity, ImportProfile, ImportProfileId, ImportProfileMapping,
    ImportRule, ImportRuleAction, ImportRuleCondition, ImportRuleId, Preference,
    RecurringTransaction, RecurringTransactionId, Resource, Transaction,
};
use crate::projection::Projector;
use crate::store::{EntityStore, Stored};
use crate::validation;

/// Entity store, derived indexes and projector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerState {
    /// Primary data.
    pub store: EntityStore,
    /// Secondary indexes over transactions and accounts.
    pub indexes: DerivedIndexes,
    /// Virtual transactions for the current window.
    pub projector: Projector,
}

impl LedgerState {
    /// Builds a state around an existing store, deriving every index.
    #[must_use]
    pub fn from_store(store: EntityStore) -> Self {
        let indexes = DerivedIndexes::build(&store);
        Self {
            store,
            indexes,
            projector: Projector::default(),
        }
    }

    /// Looks up an entity by id.
    #[inline]
    #[must_use]
    pub fn get<E: Stored>(&self, id: &E::Id) -> Option<&E> {
        E::collection(&self.store).get(id)
    }

    /// Returns `true` if an entity with this id is stored.
    #[inline]
    #[must_use]
    pub fn contains<E: Stored>(&self, id: &E::Id) -> bool {
        E::collection(&self.store).contains(id)
    }

    /// Checks that `item` may be created.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Duplicate`] if the id is taken, or the
    /// entity's own validation error.
    pub fn check_create<E: Tracked>(&self, item: &E) -> Result<(), ValidationError> {
        if self.contains::<E>(item.id()) {
            return Err(ValidationError::Duplicate {
                resource: E::RESOURCE,
                id: item.id().to_string(),
            });
        }
        item.validate(&self.store)
    }

    /// Checks that `item` may replace its stored version.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotFound`] if nothing is stored under
    /// the id, or the entity's own validation error.
    pub fn check_update<E: Tracked>(&self, item: &E) -> Result<(), ValidationError> {
        let _found = self.require::<E>(item.id())?;
        item.validate(&self.store)
    }

    /// Checks that the entity under `id` may be removed on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotFound`] if nothing is stored under
    /// the id, or [`ValidationError::InUse`] if it is still referenced.
    pub fn check_remove<E: Tracked>(&self, id: &E::Id) -> Result<(), ValidationError> {
        let _found = self.require::<E>(id)?;
        E::check_remove(&self.store, id)
    }

    /// Returns the stored entity or [`ValidationError::NotFound`].
    ///
    /// # Errors
    ///
    /// Fails if nothing is stored under `id`.
    pub fn require<E: Stored>(&self, id: &E::Id) -> Result<&E, ValidationError> {
        self.get::<E>(id).ok_or_else(|| ValidationError::NotFound {
            resource: E::RESOURCE,
            id: id.to_string(),
        })
    }

    /// Inserts or replaces an entity and updates derived state.
    ///
    /// Returns the replaced value, if any. Performs no validation.
    pub fn insert<E: Tracked>(&mut self, item: E) -> Option<E> {
        let old = E::collection_mut(&mut self.store).add(item.clone());
        match old {
            Some(ref previous) => E::replaced(self, previous, &item),
            None => E::inserted(self, &item),
        }
        old
    }

    /// Removes an entity and updates derived state.
    pub fn remove<E: Tracked>(&mut self, id: &E::Id) -> Option<E> {
        let old = E::collection_mut(&mut self.store).delete(id)?;
        E::removed(self, &old);
        Some(old)
    }

    /// Replaces the whole store, rebuilding indexes and re-projecting
    /// the current window. Returns the previous store.
    pub fn replace_all(&mut self, store: EntityStore) -> EntityStore {
        let previous = core::mem::replace(&mut self.store, store);
        self.indexes.on_replace_all(&self.store);
        match self.projector.horizon() {
            Some(until) => self.projector.add_many(until, &self.store),
            None => self.projector.clear(),
        }
        previous
    }

    /// Drops all state.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Computes an account's balance from its opening balance and
    /// member transactions.
    #[must_use]
    pub fn balance(&self, account: &AccountId) -> Option<i64> {
        let stored = self.store.accounts.get(account)?;
        let members = self.indexes.membership.transactions_of(account);
        let movement: i64 = members
            .into_iter()
            .flatten()
            .filter_map(|id| self.store.transactions.get(id))
            .map(|item| item.signed_amount(account, stored.kind))
            .sum();
        Some(stored.opening_balance + movement)
    }

    /// Computes the balance on `on` including projected transactions.
    #[must_use]
    pub fn projected_balance(&self, account: &AccountId, on: NaiveDate) -> Option<i64> {
        let stored = self.store.accounts.get(account)?;
        let real: i64 = self
            .indexes
            .membership
            .transactions_of(account)
            .into_iter()
            .flatten()
            .filter_map(|id| self.store.transactions.get(id))
            .filter(|item| item.date <= on)
            .map(|item| item.signed_amount(account, stored.kind))
            .sum();
        let projected: i64 = self
            .projector
            .until(on)
            .into_iter()
            .map(|item| item.signed_amount(account, stored.kind))
            .sum();
        Some(stored.opening_balance + real + projected)
    }

    /// Populates an account with its balance and members.
    #[must_use]
    pub fn account_view(&self, account: &AccountId) -> Option<AccountView> {
        let stored = self.store.accounts.get(account)?;
        Some(AccountView {
            account: stored.clone(),
            balance: self.balance(account)?,
            transaction_ids: self
                .indexes
                .membership
                .transactions_of(account)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default(),
        })
    }

    /// Returns `true` if the derived indexes equal a fresh rebuild.
    #[inline]
    #[must_use]
    pub fn indexes_consistent(&self) -> bool {
        self.indexes == DerivedIndexes::build(&self.store)
    }
}

/// An entity whose Commit is validated and whose store changes fan out
/// to derived structures.
pub trait Tracked: Stored {
    /// Checks the entity's fields and references against the store.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError>;

    /// Adjusts an update against the stored version before validation.
    #[inline]
    fn prepare(&mut self, _existing: &Self) {}

    /// Checks that the entity may be removed without touching others.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InUse`] if other entities still point
    /// at it.
    #[inline]
    fn check_remove(_store: &EntityStore, _id: &Self::Id) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Called after the entity entered the store.
    #[inline]
    fn inserted(_state: &mut LedgerState, _item: &Self) {}

    /// Called after the entity left the store.
    #[inline]
    fn removed(_state: &mut LedgerState, _item: &Self) {}

    /// Called after a stored entity was replaced.
    #[inline]
    fn replaced(_state: &mut LedgerState, _old: &Self, _new: &Self) {}
}

impl Tracked for Transaction {
    #[inline]
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError> {
        validation::transaction(store, self)
    }

    fn inserted(state: &mut LedgerState, item: &Self) {
        state.indexes.on_create(item);
        if let Some(ref recurring) = item.recurring_transaction_id {
            state.projector.refresh(recurring, &state.store);
        }
    }

    fn removed(state: &mut LedgerState, item: &Self) {
        state.indexes.on_delete(item);
        if let Some(ref recurring) = item.recurring_transaction_id {
            state.projector.refresh(recurring, &state.store);
        }
    }

    fn replaced(state: &mut LedgerState, old: &Self, new: &Self) {
        state.indexes.on_update(old, new);
        if let Some(ref recurring) = old.recurring_transaction_id {
            state.projector.refresh(recurring, &state.store);
        }
        if let Some(ref recurring) = new.recurring_transaction_id
            && new.recurring_transaction_id != old.recurring_transaction_id
        {
            state.projector.refresh(recurring, &state.store);
        }
    }
}

impl Tracked for Account {
    #[inline]
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError> {
        validation::account(store, self)
    }

    fn check_remove(store: &EntityStore, id: &AccountId) -> Result<(), ValidationError> {
        if store.transactions.values().any(|item| item.touches(id)) {
            return Err(ValidationError::InUse {
                resource: Resource::Account,
                id: id.to_string(),
                by: Resource::Transaction,
            });
        }
        check_account_referrers(store, id)
    }

    #[inline]
    fn inserted(state: &mut LedgerState, item: &Self) {
        state.indexes.on_account_create(&item.id, &state.store);
    }

    #[inline]
    fn removed(state: &mut LedgerState, item: &Self) {
        state.indexes.on_account_delete(&item.id);
    }
}

impl Tracked for RecurringTransaction {
    #[inline]
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError> {
        validation::recurring_transaction(store, self)
    }

    /// The realization watermark never moves backwards.
    #[inline]
    fn prepare(&mut self, existing: &Self) {
        self.last_realized_date = self.last_realized_date.max(existing.last_realized_date);
    }

    fn check_remove(
        store: &EntityStore,
        id: &RecurringTransactionId,
    ) -> Result<(), ValidationError> {
        if store.linked_transactions(id).next().is_some() {
            return Err(ValidationError::InUse {
                resource: Resource::RecurringTransaction,
                id: id.to_string(),
                by: Resource::Transaction,
            });
        }
        Ok(())
    }

    #[inline]
    fn inserted(state: &mut LedgerState, item: &Self) {
        state.projector.update(item, &state.store);
    }

    #[inline]
    fn removed(state: &mut LedgerState, item: &Self) {
        state.projector.delete(&item.id);
    }

    #[inline]
    fn replaced(state: &mut LedgerState, _old: &Self, new: &Self) {
        state.projector.update(new, &state.store);
    }
}

impl Tracked for ImportRule {
    #[inline]
    fn validate(&self, _store: &EntityStore) -> Result<(), ValidationError> {
        validation::import_rule(self)
    }

    fn check_remove(store: &EntityStore, id: &ImportRuleId) -> Result<(), ValidationError> {
        let by = if store.rule_actions(id).next().is_some() {
            Resource::ImportRuleAction
        } else if store.rule_conditions(id).next().is_some() {
            Resource::ImportRuleCondition
        } else {
            return Ok(());
        };
        Err(ValidationError::InUse {
            resource: Resource::ImportRule,
            id: id.to_string(),
            by,
        })
    }
}

impl Tracked for ImportRuleAction {
    #[inline]
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError> {
        validation::import_rule_action(store, self)
    }
}

impl Tracked for ImportRuleCondition {
    #[inline]
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError> {
        validation::import_rule_condition(store, self)
    }
}

impl Tracked for ImportProfile {
    #[inline]
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError> {
        validation::import_profile(store, self)
    }

    fn check_remove(store: &EntityStore, id: &ImportProfileId) -> Result<(), ValidationError> {
        if store.profile_mappings(id).next().is_some() {
            return Err(ValidationError::InUse {
                resource: Resource::ImportProfile,
                id: id.to_string(),
                by: Resource::ImportProfileMapping,
            });
        }
        Ok(())
    }
}

impl Tracked for ImportProfileMapping {
    #[inline]
    fn validate(&self, store: &EntityStore) -> Result<(), ValidationError> {
        validation::import_profile_mapping(store, self)
    }
}

impl Tracked for Preference {
    #[inline]
    fn validate(&self, _store: &EntityStore) -> Result<(), ValidationError> {
        validation::preference(self)
    }
}

/// Fails if anything other than transactions still references the
/// account.
///
/// # Errors
///
/// Returns [`ValidationError::InUse`] naming the first referencing
/// resource.
pub fn check_account_referrers(store: &EntityStore, id: &AccountId) -> Result<(), ValidationError> {
    let by = if store
        .recurring_transactions
        .values()
        .any(|item| item.credit_account_id == *id || item.debit_account_id == *id)
    {
        Resource::RecurringTransaction
    } else if store
        .import_rule_actions
        .values()
        .any(|item| item.account() == Some(id))
    {
        Resource::ImportRuleAction
    } else if store
        .import_profiles
        .values()
        .any(|item| item.account_id.as_ref() == Some(id))
    {
        Resource::ImportProfile
    } else {
        return Ok(());
    };
    Err(ValidationError::InUse {
        resource: Resource::Account,
        id: id.to_string(),
        by,
    })
}

/// [`LedgerState`] shared between the pipeline, the facade and readers.
///
/// Commits take the lock, run to completion and release it before any
/// `.await`, so two Commits never interleave.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    /// The state behind a mutex.
    inner: Arc<Mutex<LedgerState>>,
}

impl SharedState {
    /// Wraps a state for sharing.
    #[inline]
    #[must_use]
    pub fn new(state: LedgerState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Runs `f` with exclusive access to the state.
    ///
    /// A poisoned lock is recovered.
    #[inline]
    pub fn with_lock<R, F: FnOnce(&mut LedgerState) -> R>(&self, f: F) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Returns a copy of the current state.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> LedgerState {
        self.with_lock(|state| state.clone())
    }
}
