//! Commit, Effect and Rollback bodies for every mutating operation.
//!
//! The generic [`Create`], [`CreateMany`], [`Update`] and [`Destroy`]
//! cover single-resource changes. The remaining types keep several
//! resources consistent in one Commit: cascading destroys, parents
//! created with their children, and wholesale replacement from a backup.

use alloc::collections::BTreeSet;

use crate::error::{RemoteError, RemoteErrorKind, ValidationError};
use crate::models::{
    Account, AccountId, Entity, ImportProfile, ImportProfileId, ImportProfileMapping,
    ImportProfileView, ImportRule, ImportRuleAction, ImportRuleCondition, ImportRuleId,
    ImportRuleView, Preference, RecurringTransaction, RecurringTransactionId, Resource,
    Transaction, TransactionId,
};
use crate::remote::{REMOVE_CHUNK_SIZE, Remote, Transport};
use crate::state::{LedgerState, Tracked, check_account_referrers};
use crate::store::{EntityStore, Stored};

use super::{EffectFailure, EffectOutcome, Mutation};

/// Treats a remote error of `kind` as success.
fn tolerate(result: Result<(), RemoteError>, kind: RemoteErrorKind) -> Result<(), RemoteError> {
    match result {
        Err(err) if err.kind == kind => {
            tracing::debug!(error = %err, "tolerating remote error");
            Ok(())
        }
        other => other,
    }
}

/// Removes the children of a cascading destroy.
///
/// A chunk the service reports as missing is skipped and the rest are
/// still sent, so a stale child never keeps the parent on the server.
async fn remove_children<E: Entity, T: Transport>(
    remote: &Remote<T>,
    ids: &[E::Id],
) -> Result<(), EffectFailure> {
    let mut rest = ids;
    loop {
        match remote.remove_many::<E>(rest).await {
            Ok(()) => return Ok(()),
            Err(err) if err.error.kind == RemoteErrorKind::NotFound => {
                tracing::debug!(error = %err.error, "skipping missing children");
                rest = rest
                    .get(err.removed.saturating_add(REMOVE_CHUNK_SIZE)..)
                    .unwrap_or_default();
            }
            Err(err) => {
                let skipped = rest.len() != ids.len();
                return Err(EffectFailure::from(err).after_progress(skipped));
            }
        }
    }
}

/// Removes `id` if present.
fn remove_if_present<E: Tracked>(state: &mut LedgerState, id: &E::Id) {
    if state.contains::<E>(id) {
        let _removed = state.remove::<E>(id);
    }
}

/// Inserts `item` unless its id is already stored.
fn insert_if_absent<E: Tracked>(state: &mut LedgerState, item: &E) {
    if !state.contains::<E>(item.id()) {
        let _previous = state.insert(item.clone());
    }
}

/// Creates one entity.
///
/// A remote uniqueness conflict means an earlier attempt already landed,
/// so it is reconciled instead of rolled back.
#[derive(Debug, Clone)]
pub struct Create<E>(pub E);

impl<E: Tracked> Mutation for Create<E> {
    type Output = E;
    type Rollback = ();

    #[inline]
    fn describe(&self) -> String {
        format!("create {} {}", E::RESOURCE, self.0.id())
    }

    fn commit(&self, state: &mut LedgerState) -> Result<(E, ()), ValidationError> {
        state.check_create(&self.0)?;
        let _previous = state.insert(self.0.clone());
        Ok((self.0.clone(), ()))
    }

    async fn effect<T: Transport>(&self, remote: &Remote<T>, output: &E) -> EffectOutcome {
        remote.create(output).await.into()
    }

    #[inline]
    fn suppresses(&self, failure: &EffectFailure) -> bool {
        failure.kind == RemoteErrorKind::AlreadyExists
    }

    #[inline]
    fn rollback(&self, state: &mut LedgerState, _rollback: ()) {
        remove_if_present::<E>(state, self.0.id());
    }
}

/// Creates a batch of entities in one Commit and one remote call.
#[derive(Debug, Clone)]
pub struct CreateMany<E>(pub Vec<E>);

impl<E: Tracked> Mutation for CreateMany<E> {
    type Output = Vec<E>;
    type Rollback = ();

    #[inline]
    fn describe(&self) -> String {
        format!("create {} {} records", self.0.len(), E::RESOURCE)
    }

    fn commit(&self, state: &mut LedgerState) -> Result<(Vec<E>, ()), ValidationError> {
        let mut seen = BTreeSet::new();
        for item in &self.0 {
            if !seen.insert(item.id()) {
                return Err(ValidationError::Duplicate {
                    resource: E::RESOURCE,
                    id: item.id().to_string(),
                });
            }
            state.check_create(item)?;
        }
        for item in &self.0 {
            let _previous = state.insert(item.clone());
        }
        Ok((self.0.clone(), ()))
    }

    async fn effect<T: Transport>(&self, remote: &Remote<T>, output: &Vec<E>) -> EffectOutcome {
        remote.create_many(output).await.into()
    }

    #[inline]
    fn suppresses(&self, failure: &EffectFailure) -> bool {
        failure.kind == RemoteErrorKind::AlreadyExists
    }

    fn rollback(&self, state: &mut LedgerState, _rollback: ()) {
        for item in &self.0 {
            remove_if_present::<E>(state, item.id());
        }
    }
}

/// Replaces a stored entity.
#[derive(Debug, Clone)]
pub struct Update<E>(pub E);

impl<E: Tracked> Mutation for Update<E> {
    type Output = E;
    type Rollback = E;

    #[inline]
    fn describe(&self) -> String {
        format!("update {} {}", E::RESOURCE, self.0.id())
    }

    fn commit(&self, state: &mut LedgerState) -> Result<(E, E), ValidationError> {
        let existing = state.require::<E>(self.0.id())?.clone();
        let mut item = self.0.clone();
        item.prepare(&existing);
        item.validate(&state.store)?;
        let _previous = state.insert(item.clone());
        Ok((item, existing))
    }

    async fn effect<T: Transport>(&self, remote: &Remote<T>, output: &E) -> EffectOutcome {
        remote.update(output).await.into()
    }

    fn rollback(&self, state: &mut LedgerState, previous: E) {
        if state.contains::<E>(previous.id()) {
            let _current = state.insert(previous);
        }
    }
}

/// Removes an entity nothing else references.
///
/// A remote "not found" means the entity is already gone, so it is
/// reconciled instead of rolled back.
#[derive(Debug, Clone)]
pub struct Destroy<E: Entity>(pub E::Id);

impl<E: Tracked> Mutation for Destroy<E> {
    type Output = E;
    type Rollback = E;

    #[inline]
    fn describe(&self) -> String {
        format!("delete {} {}", E::RESOURCE, self.0)
    }

    fn commit(&self, state: &mut LedgerState) -> Result<(E, E), ValidationError> {
        state.check_remove::<E>(&self.0)?;
        let removed = state
            .remove::<E>(&self.0)
            .ok_or_else(|| ValidationError::NotFound {
                resource: E::RESOURCE,
                id: self.0.to_string(),
            })?;
        Ok((removed.clone(), removed))
    }

    async fn effect<T: Transport>(&self, remote: &Remote<T>, output: &E) -> EffectOutcome {
        remote.remove::<E>(output.id()).await.into()
    }

    #[inline]
    fn suppresses(&self, failure: &EffectFailure) -> bool {
        failure.kind == RemoteErrorKind::NotFound
    }

    #[inline]
    fn rollback(&self, state: &mut LedgerState, removed: E) {
        insert_if_absent(state, &removed);
    }
}

/// An account together with the transactions that referenced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// The removed account.
    pub account: Account,
    /// Its transactions, ordered by id.
    pub transactions: Vec<Transaction>,
}

/// Removes an account and every transaction touching it.
///
/// Other references (recurring transactions, import rule actions, import
/// profiles) must be cleared first.
#[derive(Debug, Clone)]
pub struct DestroyAccount(pub AccountId);

impl Mutation for DestroyAccount {
    type Output = AccountSnapshot;
    type Rollback = AccountSnapshot;

    #[inline]
    fn describe(&self) -> String {
        format!("delete account {}", self.0)
    }

    fn commit(
        &self,
        state: &mut LedgerState,
    ) -> Result<(AccountSnapshot, AccountSnapshot), ValidationError> {
        let account = state.require::<Account>(&self.0)?.clone();
        check_account_referrers(&state.store, &self.0)?;
        let members: Vec<TransactionId> = state
            .indexes
            .membership
            .transactions_of(&self.0)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let transactions: Vec<Transaction> = members
            .iter()
            .filter_map(|id| state.remove::<Transaction>(id))
            .collect();
        let _account = state.remove::<Account>(&self.0);
        tracing::debug!(
            account = %self.0,
            cascaded = transactions.len(),
            "removed account and its transactions"
        );
        let snapshot = AccountSnapshot {
            account,
            transactions,
        };
        Ok((snapshot.clone(), snapshot))
    }

    async fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &AccountSnapshot,
    ) -> EffectOutcome {
        let ids: Vec<TransactionId> = output
            .transactions
            .iter()
            .map(|item| item.id.clone())
            .collect();
        if let Err(failure) = remove_children::<Transaction, T>(remote, &ids).await {
            return EffectOutcome::Failure(failure);
        }
        remote
            .remove::<Account>(&output.account.id)
            .await
            .map_err(|err| EffectFailure::from(err).after_progress(!ids.is_empty()))
            .into()
    }

    #[inline]
    fn suppresses(&self, failure: &EffectFailure) -> bool {
        failure.kind == RemoteErrorKind::NotFound
    }

    /// Restores the account first so its balance starts from the opening
    /// balance, then re-adds its transactions.
    fn rollback(&self, state: &mut LedgerState, snapshot: AccountSnapshot) {
        if state.contains::<Account>(&snapshot.account.id) {
            return;
        }
        let _previous = state.insert(snapshot.account);
        for item in &snapshot.transactions {
            insert_if_absent(state, item);
        }
    }
}

/// Collects a rule and its children from the store.
fn rule_view(state: &LedgerState, id: &ImportRuleId) -> Result<ImportRuleView, ValidationError> {
    let rule = state.require::<ImportRule>(id)?.clone();
    Ok(ImportRuleView {
        actions: state.store.rule_actions(id).cloned().collect(),
        conditions: state.store.rule_conditions(id).cloned().collect(),
        rule,
    })
}

/// Creates an import rule together with its actions and conditions.
#[derive(Debug, Clone)]
pub struct CreateImportRule(pub ImportRuleView);

impl CreateImportRule {
    /// Checks every child and fails on the first invalid one.
    fn check_children(&self, state: &LedgerState) -> Result<(), ValidationError> {
        let rule = &self.0.rule.id;
        let mut actions = BTreeSet::new();
        for action in &self.0.actions {
            if action.import_rule_id != *rule {
                return Err(ValidationError::ForeignChild {
                    resource: Resource::ImportRuleAction,
                    id: action.id.to_string(),
                });
            }
            if !actions.insert(&action.id) {
                return Err(ValidationError::Duplicate {
                    resource: Resource::ImportRuleAction,
                    id: action.id.to_string(),
                });
            }
            state.check_create(action)?;
        }
        let mut conditions = BTreeSet::new();
        for condition in &self.0.conditions {
            if condition.import_rule_id != *rule {
                return Err(ValidationError::ForeignChild {
                    resource: Resource::ImportRuleCondition,
                    id: condition.id.to_string(),
                });
            }
            if !conditions.insert(&condition.id) {
                return Err(ValidationError::Duplicate {
                    resource: Resource::ImportRuleCondition,
                    id: condition.id.to_string(),
                });
            }
            state.check_create(condition)?;
        }
        Ok(())
    }
}

impl Mutation for CreateImportRule {
    type Output = ImportRuleView;
    type Rollback = ();

    #[inline]
    fn describe(&self) -> String {
        format!("create import rule {}", self.0.rule.id)
    }

    fn commit(&self, state: &mut LedgerState) -> Result<(ImportRuleView, ()), ValidationError> {
        state.check_create(&self.0.rule)?;
        // Children are checked against the store with the parent in place;
        // rules carry no derived state, so taking it out again is exact.
        let _previous = state.insert(self.0.rule.clone());
        if let Err(err) = self.check_children(state) {
            let _rule = state.remove::<ImportRule>(&self.0.rule.id);
            return Err(err);
        }
        for action in &self.0.actions {
            let _previous = state.insert(action.clone());
        }
        for condition in &self.0.conditions {
            let _previous = state.insert(condition.clone());
        }
        Ok((self.0.clone(), ()))
    }

    async fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &ImportRuleView,
    ) -> EffectOutcome {
        if let Err(err) = tolerate(
            remote.create(&output.rule).await,
            RemoteErrorKind::AlreadyExists,
        ) {
            return EffectOutcome::Failure(err.into());
        }
        let children = async {
            tolerate(
                remote.create_many(&output.actions).await,
                RemoteErrorKind::AlreadyExists,
            )?;
            tolerate(
                remote.create_many(&output.conditions).await,
                RemoteErrorKind::AlreadyExists,
            )
        };
        children
            .await
            .map_err(|err| EffectFailure::from(err).after_progress(true))
            .into()
    }

    fn rollback(&self, state: &mut LedgerState, _rollback: ()) {
        for action in &self.0.actions {
            remove_if_present::<ImportRuleAction>(state, &action.id);
        }
        for condition in &self.0.conditions {
            remove_if_present::<ImportRuleCondition>(state, &condition.id);
        }
        remove_if_present::<ImportRule>(state, &self.0.rule.id);
    }
}

/// Removes an import rule and its children.
#[derive(Debug, Clone)]
pub struct DestroyImportRule(pub ImportRuleId);

impl Mutation for DestroyImportRule {
    type Output = ImportRuleView;
    type Rollback = ImportRuleView;

    #[inline]
    fn describe(&self) -> String {
        format!("delete import rule {}", self.0)
    }

    fn commit(
        &self,
        state: &mut LedgerState,
    ) -> Result<(ImportRuleView, ImportRuleView), ValidationError> {
        let view = rule_view(state, &self.0)?;
        for action in &view.actions {
            let _removed = state.remove::<ImportRuleAction>(&action.id);
        }
        for condition in &view.conditions {
            let _removed = state.remove::<ImportRuleCondition>(&condition.id);
        }
        let _rule = state.remove::<ImportRule>(&self.0);
        Ok((view.clone(), view))
    }

    async fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &ImportRuleView,
    ) -> EffectOutcome {
        let actions: Vec<_> = output.actions.iter().map(|item| item.id.clone()).collect();
        let conditions: Vec<_> = output
            .conditions
            .iter()
            .map(|item| item.id.clone())
            .collect();
        if let Err(failure) = remove_children::<ImportRuleAction, T>(remote, &actions).await {
            return EffectOutcome::Failure(failure);
        }
        if let Err(failure) =
            remove_children::<ImportRuleCondition, T>(remote, &conditions).await
        {
            return EffectOutcome::Failure(failure.after_progress(!actions.is_empty()));
        }
        let progressed = !actions.is_empty() || !conditions.is_empty();
        remote
            .remove::<ImportRule>(&output.rule.id)
            .await
            .map_err(|err| EffectFailure::from(err).after_progress(progressed))
            .into()
    }

    #[inline]
    fn suppresses(&self, failure: &EffectFailure) -> bool {
        failure.kind == RemoteErrorKind::NotFound
    }

    fn rollback(&self, state: &mut LedgerState, view: ImportRuleView) {
        if state.contains::<ImportRule>(&view.rule.id) {
            return;
        }
        let _previous = state.insert(view.rule);
        for action in &view.actions {
            insert_if_absent(state, action);
        }
        for condition in &view.conditions {
            insert_if_absent(state, condition);
        }
    }
}

/// Creates an import profile together with its column mappings.
#[derive(Debug, Clone)]
pub struct CreateImportProfile(pub ImportProfileView);

impl Mutation for CreateImportProfile {
    type Output = ImportProfileView;
    type Rollback = ();

    #[inline]
    fn describe(&self) -> String {
        format!("create import profile {}", self.0.profile.id)
    }

    fn commit(&self, state: &mut LedgerState) -> Result<(ImportProfileView, ()), ValidationError> {
        state.check_create(&self.0.profile)?;
        let _previous = state.insert(self.0.profile.clone());
        let mut seen = BTreeSet::new();
        let checked = self.0.mappings.iter().try_for_each(|mapping| {
            if mapping.import_profile_id != self.0.profile.id {
                return Err(ValidationError::ForeignChild {
                    resource: Resource::ImportProfileMapping,
                    id: mapping.id.to_string(),
                });
            }
            if !seen.insert(&mapping.id) {
                return Err(ValidationError::Duplicate {
                    resource: Resource::ImportProfileMapping,
                    id: mapping.id.to_string(),
                });
            }
            state.check_create(mapping)
        });
        if let Err(err) = checked {
            let _profile = state.remove::<ImportProfile>(&self.0.profile.id);
            return Err(err);
        }
        for mapping in &self.0.mappings {
            let _previous = state.insert(mapping.clone());
        }
        Ok((self.0.clone(), ()))
    }

    async fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &ImportProfileView,
    ) -> EffectOutcome {
        if let Err(err) = tolerate(
            remote.create(&output.profile).await,
            RemoteErrorKind::AlreadyExists,
        ) {
            return EffectOutcome::Failure(err.into());
        }
        tolerate(
            remote.create_many(&output.mappings).await,
            RemoteErrorKind::AlreadyExists,
        )
        .map_err(|err| EffectFailure::from(err).after_progress(true))
        .into()
    }

    fn rollback(&self, state: &mut LedgerState, _rollback: ()) {
        for mapping in &self.0.mappings {
            remove_if_present::<ImportProfileMapping>(state, &mapping.id);
        }
        remove_if_present::<ImportProfile>(state, &self.0.profile.id);
    }
}

/// Removes an import profile and its mappings.
#[derive(Debug, Clone)]
pub struct DestroyImportProfile(pub ImportProfileId);

impl Mutation for DestroyImportProfile {
    type Output = ImportProfileView;
    type Rollback = ImportProfileView;

    #[inline]
    fn describe(&self) -> String {
        format!("delete import profile {}", self.0)
    }

    fn commit(
        &self,
        state: &mut LedgerState,
    ) -> Result<(ImportProfileView, ImportProfileView), ValidationError> {
        let profile = state.require::<ImportProfile>(&self.0)?.clone();
        let mappings: Vec<ImportProfileMapping> =
            state.store.profile_mappings(&self.0).cloned().collect();
        for mapping in &mappings {
            let _removed = state.remove::<ImportProfileMapping>(&mapping.id);
        }
        let _profile = state.remove::<ImportProfile>(&self.0);
        let view = ImportProfileView { profile, mappings };
        Ok((view.clone(), view))
    }

    async fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &ImportProfileView,
    ) -> EffectOutcome {
        let mappings: Vec<_> = output.mappings.iter().map(|item| item.id.clone()).collect();
        if let Err(failure) =
            remove_children::<ImportProfileMapping, T>(remote, &mappings).await
        {
            return EffectOutcome::Failure(failure);
        }
        remote
            .remove::<ImportProfile>(&output.profile.id)
            .await
            .map_err(|err| EffectFailure::from(err).after_progress(!mappings.is_empty()))
            .into()
    }

    #[inline]
    fn suppresses(&self, failure: &EffectFailure) -> bool {
        failure.kind == RemoteErrorKind::NotFound
    }

    fn rollback(&self, state: &mut LedgerState, view: ImportProfileView) {
        if state.contains::<ImportProfile>(&view.profile.id) {
            return;
        }
        let _previous = state.insert(view.profile);
        for mapping in &view.mappings {
            insert_if_absent(state, mapping);
        }
    }
}

/// A recurring transaction and the transactions that were linked to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringSnapshot {
    /// The removed definition.
    pub recurring: RecurringTransaction,
    /// Transactions whose back-reference was cleared.
    pub linked: Vec<TransactionId>,
}

/// Removes a recurring transaction and clears the back-reference on the
/// transactions realized from it, as the service does on its side.
#[derive(Debug, Clone)]
pub struct DestroyRecurringTransaction(pub RecurringTransactionId);

impl Mutation for DestroyRecurringTransaction {
    type Output = RecurringSnapshot;
    type Rollback = RecurringSnapshot;

    #[inline]
    fn describe(&self) -> String {
        format!("delete recurring transaction {}", self.0)
    }

    fn commit(
        &self,
        state: &mut LedgerState,
    ) -> Result<(RecurringSnapshot, RecurringSnapshot), ValidationError> {
        let recurring = state.require::<RecurringTransaction>(&self.0)?.clone();
        let linked: Vec<Transaction> = state.store.linked_transactions(&self.0).cloned().collect();
        let _removed = state.remove::<RecurringTransaction>(&self.0);
        for mut item in linked.iter().cloned() {
            item.recurring_transaction_id = None;
            let _previous = state.insert(item);
        }
        let snapshot = RecurringSnapshot {
            recurring,
            linked: linked.into_iter().map(|item| item.id).collect(),
        };
        Ok((snapshot.clone(), snapshot))
    }

    async fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &RecurringSnapshot,
    ) -> EffectOutcome {
        remote
            .remove::<RecurringTransaction>(&output.recurring.id)
            .await
            .into()
    }

    #[inline]
    fn suppresses(&self, failure: &EffectFailure) -> bool {
        failure.kind == RemoteErrorKind::NotFound
    }

    fn rollback(&self, state: &mut LedgerState, snapshot: RecurringSnapshot) {
        if state.contains::<RecurringTransaction>(&snapshot.recurring.id) {
            return;
        }
        let id = snapshot.recurring.id.clone();
        let _previous = state.insert(snapshot.recurring);
        for transaction in &snapshot.linked {
            let Some(item) = state.get::<Transaction>(transaction) else {
                continue;
            };
            if item.recurring_transaction_id.is_some() {
                continue;
            }
            let mut relinked = item.clone();
            relinked.recurring_transaction_id = Some(id.clone());
            let _previous = state.insert(relinked);
        }
    }
}

/// The stores on both sides of a wholesale replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacePlan {
    /// Store before the replacement.
    pub previous: EntityStore,
    /// Store after the replacement.
    pub next: EntityStore,
}

/// Validates every entity of one resource against `store`.
fn check_all<E: Tracked>(store: &EntityStore) -> Result<(), ValidationError> {
    E::collection(store)
        .values()
        .try_for_each(|item| item.validate(store))
}

/// Removes every remote record of one resource listed in `store`.
async fn clear_remote<E: Stored, T: Transport>(
    remote: &Remote<T>,
    store: &EntityStore,
    progressed: &mut bool,
) -> Result<(), EffectFailure> {
    let ids: Vec<E::Id> = E::collection(store)
        .values()
        .map(|item| item.id().clone())
        .collect();
    let result = remote.remove_many::<E>(&ids).await;
    let failed = result.map_err(|err| EffectFailure::from(err).after_progress(*progressed));
    *progressed = *progressed || !ids.is_empty();
    failed
}

/// Uploads every record of one resource in `store`.
async fn upload<E: Stored, T: Transport>(
    remote: &Remote<T>,
    store: &EntityStore,
    progressed: &mut bool,
) -> Result<(), EffectFailure> {
    let items: Vec<E> = E::collection(store).values().cloned().collect();
    let result = remote.create_many(&items).await;
    let failed = result.map_err(|err| EffectFailure::from(err).after_progress(*progressed));
    *progressed = *progressed || !items.is_empty();
    failed
}

/// Replaces the whole store, as when restoring a backup.
///
/// The Effect removes every previously known remote record, children
/// first, then uploads the new contents, parents first.
#[derive(Debug, Clone)]
pub struct ReplaceAll(pub EntityStore);

impl ReplaceAll {
    /// Runs the removal and upload steps in dependency order.
    async fn sync<T: Transport>(
        remote: &Remote<T>,
        plan: &ReplacePlan,
    ) -> Result<(), EffectFailure> {
        let mut progressed = false;
        let old = &plan.previous;
        clear_remote::<Preference, T>(remote, old, &mut progressed).await?;
        clear_remote::<ImportProfileMapping, T>(remote, old, &mut progressed).await?;
        clear_remote::<ImportProfile, T>(remote, old, &mut progressed).await?;
        clear_remote::<ImportRuleCondition, T>(remote, old, &mut progressed).await?;
        clear_remote::<ImportRuleAction, T>(remote, old, &mut progressed).await?;
        clear_remote::<ImportRule, T>(remote, old, &mut progressed).await?;
        clear_remote::<Transaction, T>(remote, old, &mut progressed).await?;
        clear_remote::<RecurringTransaction, T>(remote, old, &mut progressed).await?;
        clear_remote::<Account, T>(remote, old, &mut progressed).await?;

        let new = &plan.next;
        upload::<Account, T>(remote, new, &mut progressed).await?;
        upload::<RecurringTransaction, T>(remote, new, &mut progressed).await?;
        upload::<Transaction, T>(remote, new, &mut progressed).await?;
        upload::<ImportRule, T>(remote, new, &mut progressed).await?;
        upload::<ImportRuleAction, T>(remote, new, &mut progressed).await?;
        upload::<ImportRuleCondition, T>(remote, new, &mut progressed).await?;
        upload::<ImportProfile, T>(remote, new, &mut progressed).await?;
        upload::<ImportProfileMapping, T>(remote, new, &mut progressed).await?;
        upload::<Preference, T>(remote, new, &mut progressed).await
    }
}

impl Mutation for ReplaceAll {
    type Output = ReplacePlan;
    type Rollback = EntityStore;

    #[inline]
    fn describe(&self) -> String {
        "restore backup".to_owned()
    }

    fn commit(
        &self,
        state: &mut LedgerState,
    ) -> Result<(ReplacePlan, EntityStore), ValidationError> {
        let next = &self.0;
        check_all::<Account>(next)?;
        check_all::<Transaction>(next)?;
        check_all::<RecurringTransaction>(next)?;
        check_all::<ImportRule>(next)?;
        check_all::<ImportRuleAction>(next)?;
        check_all::<ImportRuleCondition>(next)?;
        check_all::<ImportProfile>(next)?;
        check_all::<ImportProfileMapping>(next)?;
        check_all::<Preference>(next)?;
        let previous = state.replace_all(next.clone());
        let plan = ReplacePlan {
            previous: previous.clone(),
            next: next.clone(),
        };
        Ok((plan, previous))
    }

    async fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &ReplacePlan,
    ) -> EffectOutcome {
        Self::sync(remote, output).await.into()
    }

    #[inline]
    fn rollback(&self, state: &mut LedgerState, previous: EntityStore) {
        if state.store != previous {
            let _replaced = state.replace_all(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::models::{
        AccountType, ConditionField, ConditionOperator, Frequency, ImportRuleActionId,
        ImportRuleConditionId, NaiveDate, RecurrenceEnd, RecurrenceRule, RuleAction,
        TransactionType,
    };
    use crate::notify::{Level, RecordingNotifier};
    use crate::pipeline::{Outcome, Pipeline};
    use crate::remote::{InMemoryTransport, Operation};
    use crate::state::SharedState;

    struct Harness {
        pipeline: Pipeline<InMemoryTransport>,
        transport: InMemoryTransport,
        notifier: RecordingNotifier,
    }

    impl Harness {
        fn new(state: LedgerState) -> Self {
            let transport = InMemoryTransport::new();
            let notifier = RecordingNotifier::default();
            let pipeline = Pipeline::new(
                SharedState::new(state),
                Remote::new(transport.clone()),
                Arc::new(notifier.clone()),
            );
            Self {
                pipeline,
                transport,
                notifier,
            }
        }

        fn snapshot(&self) -> LedgerState {
            self.pipeline.state().snapshot()
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn account(id: &str, kind: AccountType) -> Account {
        Account {
            id: AccountId::from(id),
            name: id.to_owned(),
            kind,
            opening_balance: 0,
        }
    }

    fn tx(id: &str, description: &str, credit: &str, debit: &str) -> Transaction {
        Transaction {
            id: TransactionId::from(id),
            amount: 500,
            date: date(4),
            description: description.to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from(credit),
            debit_account_id: AccountId::from(debit),
            recurring_transaction_id: None,
        }
    }

    fn seeded() -> LedgerState {
        let mut state = LedgerState::default();
        for item in [
            account("a", AccountType::Asset),
            account("b", AccountType::Expense),
            account("c", AccountType::Asset),
        ] {
            let _old = state.insert(item);
        }
        state.projector.add_many(date(31), &state.store);
        state
    }

    fn recurring() -> RecurringTransaction {
        RecurringTransaction {
            id: RecurringTransactionId::from("r1"),
            amount: 900,
            description: "Rent".to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("a"),
            debit_account_id: AccountId::from("b"),
            recurrence: RecurrenceRule {
                interval: 1,
                frequency: Frequency::Week,
                anchor: None,
                start_date: date(1),
                end: RecurrenceEnd::Never,
            },
            last_realized_date: None,
        }
    }

    #[tokio::test]
    async fn create_commits_and_sends() {
        let harness = Harness::new(seeded());
        let report = harness
            .pipeline
            .run(Create(tx("t1", "Coffee", "a", "b")))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        let state = harness.snapshot();
        assert!(state.contains::<Transaction>(&TransactionId::from("t1")));
        assert!(state.indexes_consistent());
        assert!(harness.transport.contains(Resource::Transaction, "t1"));
        assert!(harness.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn failed_create_restores_every_derived_structure() {
        let harness = Harness::new(seeded());
        let before = harness.snapshot();
        harness.transport.fail_next(
            Resource::Transaction,
            Operation::Create,
            RemoteErrorKind::Unavailable,
        );
        let report = harness
            .pipeline
            .run(Create(tx("t1", "Coffee", "a", "b")))
            .await
            .unwrap();

        assert!(matches!(report.outcome, Outcome::RolledBack(_)));
        let after = harness.snapshot();
        assert_eq!(after, before);
        assert!(after.indexes.text.search_words("coffee").is_empty());
        let notes = harness.notifier.take();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, Level::Error);
        assert!(notes[0].message.contains("create transaction t1"));
    }

    #[tokio::test]
    async fn unique_conflict_keeps_committed_state() {
        let harness = Harness::new(seeded());
        harness.transport.seed(
            Resource::Transaction,
            [serde_json::json!({ "id": "t1" })],
        );
        let report = harness
            .pipeline
            .run(Create(tx("t1", "Coffee", "a", "b")))
            .await
            .unwrap();

        assert!(matches!(report.outcome, Outcome::Reconciled(_)));
        assert!(report.is_applied());
        let mut expected = seeded();
        let _old = expected.insert(tx("t1", "Coffee", "a", "b"));
        assert_eq!(harness.snapshot(), expected);
        assert!(harness.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn validation_failure_touches_nothing() {
        let harness = Harness::new(seeded());
        let before = harness.snapshot();
        let err = harness
            .pipeline
            .run(Create(tx("t1", "", "a", "b")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::Empty {
                field: "description"
            }
        );
        assert_eq!(harness.snapshot(), before);
        assert!(harness.transport.calls().is_empty());
        assert!(harness.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn failed_update_swaps_membership_back() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let harness = Harness::new(state);
        let before = harness.snapshot();
        harness.transport.fail_next(
            Resource::Transaction,
            Operation::Update,
            RemoteErrorKind::Server { status: 500 },
        );
        let report = harness
            .pipeline
            .run(Update(tx("t1", "Tea", "c", "b")))
            .await
            .unwrap();
        assert!(!report.is_applied());
        assert_eq!(harness.snapshot(), before);
        assert!(
            before
                .indexes
                .membership
                .contains(&AccountId::from("a"), &TransactionId::from("t1"))
        );
    }

    #[tokio::test]
    async fn destroy_of_remotely_missing_entity_is_reconciled() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let harness = Harness::new(state);
        let report = harness
            .pipeline
            .run(Destroy::<Transaction>(TransactionId::from("t1")))
            .await
            .unwrap();
        assert!(matches!(report.outcome, Outcome::Reconciled(_)));
        assert!(
            !harness
                .snapshot()
                .contains::<Transaction>(&TransactionId::from("t1"))
        );
    }

    #[tokio::test]
    async fn destroy_refuses_referenced_account() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let harness = Harness::new(state);
        let err = harness
            .pipeline
            .run(Destroy::<Account>(AccountId::from("a")))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InUse { by: Resource::Transaction, .. }));
    }

    #[tokio::test]
    async fn account_destroy_cascades_and_rolls_back_exactly() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let _old = state.insert(tx("t2", "Lunch", "a", "b"));
        let _old = state.insert(tx("t3", "Cinema", "c", "b"));
        let harness = Harness::new(state);
        let before = harness.snapshot();

        harness.transport.fail_next(
            Resource::Account,
            Operation::Remove,
            RemoteErrorKind::Timeout,
        );
        let report = harness
            .pipeline
            .run(DestroyAccount(AccountId::from("a")))
            .await
            .unwrap();

        assert_eq!(report.value.transactions.len(), 2);
        let failure = report.failure().unwrap();
        assert!(failure.partial);
        assert_eq!(harness.snapshot(), before);
        let notes = harness.notifier.take();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("remain on the server"));
    }

    #[tokio::test]
    async fn account_destroy_removes_members_remotely() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let harness = Harness::new(state);
        harness.transport.seed(
            Resource::Transaction,
            [serde_json::json!({ "id": "t1" })],
        );
        harness
            .transport
            .seed(Resource::Account, [serde_json::json!({ "id": "a" })]);

        let report = harness
            .pipeline
            .run(DestroyAccount(AccountId::from("a")))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        let state = harness.snapshot();
        assert!(!state.contains::<Account>(&AccountId::from("a")));
        assert!(state.store.transactions.is_empty());
        assert_eq!(state.balance(&AccountId::from("b")), Some(0));
        assert!(!harness.transport.contains(Resource::Transaction, "t1"));
        assert!(!harness.transport.contains(Resource::Account, "a"));
    }

    #[tokio::test]
    async fn account_destroy_goes_on_when_members_are_already_gone() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let harness = Harness::new(state);
        harness
            .transport
            .seed(Resource::Account, [serde_json::json!({ "id": "a" })]);
        harness.transport.fail_next(
            Resource::Transaction,
            Operation::RemoveMany,
            RemoteErrorKind::NotFound,
        );

        let report = harness
            .pipeline
            .run(DestroyAccount(AccountId::from("a")))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert!(!harness.snapshot().contains::<Account>(&AccountId::from("a")));
        assert!(!harness.transport.contains(Resource::Account, "a"));
        assert!(harness.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn missing_chunk_does_not_stop_later_members() {
        let mut state = seeded();
        for index in 0..40 {
            let _old = state.insert(tx(&format!("t{index:02}"), "Coffee", "a", "b"));
        }
        let harness = Harness::new(state);
        let records: Vec<_> = (0..40)
            .map(|index| serde_json::json!({ "id": format!("t{index:02}") }))
            .collect();
        harness.transport.seed(Resource::Transaction, records);
        harness
            .transport
            .seed(Resource::Account, [serde_json::json!({ "id": "a" })]);
        harness.transport.fail_next(
            Resource::Transaction,
            Operation::RemoveMany,
            RemoteErrorKind::NotFound,
        );

        let report = harness
            .pipeline
            .run(DestroyAccount(AccountId::from("a")))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert!(!harness.transport.contains(Resource::Transaction, "t35"));
        assert!(!harness.transport.contains(Resource::Account, "a"));
    }

    fn rule() -> ImportRuleView {
        let id = ImportRuleId::from("rule");
        ImportRuleView {
            rule: ImportRule {
                id: id.clone(),
                name: "Groceries".to_owned(),
            },
            actions: vec![ImportRuleAction {
                id: ImportRuleActionId::from("act"),
                import_rule_id: id.clone(),
                action: RuleAction::SetDebitAccount {
                    account_id: AccountId::from("b"),
                },
            }],
            conditions: vec![ImportRuleCondition {
                id: ImportRuleConditionId::from("cond"),
                import_rule_id: id,
                field: ConditionField::Description,
                operator: ConditionOperator::Contains,
                value: "market".to_owned(),
            }],
        }
    }

    #[tokio::test]
    async fn import_rule_round_trip() {
        let harness = Harness::new(seeded());
        let before = harness.snapshot();
        let report = harness.pipeline.run(CreateImportRule(rule())).await.unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(harness.snapshot().store.import_rule_actions.len(), 1);
        assert!(harness.transport.contains(Resource::ImportRuleCondition, "cond"));

        let report = harness
            .pipeline
            .run(DestroyImportRule(ImportRuleId::from("rule")))
            .await
            .unwrap();
        assert_eq!(report.value, rule());
        assert_eq!(harness.snapshot(), before);
        assert!(harness.transport.records(Resource::ImportRuleAction).is_empty());
    }

    #[tokio::test]
    async fn import_rule_destroy_removes_rule_when_actions_are_gone() {
        let harness = Harness::new(seeded());
        let report = harness.pipeline.run(CreateImportRule(rule())).await.unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        harness.transport.fail_next(
            Resource::ImportRuleAction,
            Operation::RemoveMany,
            RemoteErrorKind::NotFound,
        );

        let report = harness
            .pipeline
            .run(DestroyImportRule(ImportRuleId::from("rule")))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert!(!harness.transport.contains(Resource::ImportRuleCondition, "cond"));
        assert!(!harness.transport.contains(Resource::ImportRule, "rule"));
    }

    #[tokio::test]
    async fn import_rule_with_foreign_child_is_rejected_whole() {
        let harness = Harness::new(seeded());
        let before = harness.snapshot();
        let mut view = rule();
        view.actions[0].import_rule_id = ImportRuleId::from("other");
        let err = harness.pipeline.run(CreateImportRule(view)).await.unwrap_err();
        assert!(matches!(err, ValidationError::ForeignChild { .. }));
        assert_eq!(harness.snapshot(), before);
    }

    #[tokio::test]
    async fn recurring_destroy_unlinks_and_rollback_relinks() {
        let mut state = seeded();
        let _old = state.insert(recurring());
        let mut realized = recurring().realize(date(1));
        realized.id = TransactionId::from("real");
        let _old = state.insert(realized);
        let harness = Harness::new(state);
        let before = harness.snapshot();

        harness.transport.fail_next(
            Resource::RecurringTransaction,
            Operation::Remove,
            RemoteErrorKind::Unavailable,
        );
        let report = harness
            .pipeline
            .run(DestroyRecurringTransaction(RecurringTransactionId::from("r1")))
            .await
            .unwrap();
        assert_eq!(report.value.linked, vec![TransactionId::from("real")]);
        assert_eq!(harness.snapshot(), before);
    }

    #[tokio::test]
    async fn recurring_destroy_clears_projection() {
        let mut state = seeded();
        let _old = state.insert(recurring());
        assert!(!state.projector.is_empty());
        let harness = Harness::new(state);
        harness.transport.seed(
            Resource::RecurringTransaction,
            [serde_json::json!({ "id": "r1" })],
        );
        let report = harness
            .pipeline
            .run(DestroyRecurringTransaction(RecurringTransactionId::from("r1")))
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert!(harness.snapshot().projector.is_empty());
    }

    #[tokio::test]
    async fn watermark_never_moves_back_on_update() {
        let mut state = seeded();
        let mut definition = recurring();
        definition.last_realized_date = Some(date(15));
        let _old = state.insert(definition.clone());
        let harness = Harness::new(state);
        harness.transport.seed(
            Resource::RecurringTransaction,
            [serde_json::json!({ "id": "r1" })],
        );

        definition.last_realized_date = Some(date(2));
        definition.description = "Rent (flat)".to_owned();
        let report = harness.pipeline.run(Update(definition)).await.unwrap();
        assert_eq!(report.value.last_realized_date, Some(date(15)));
        assert_eq!(report.value.description, "Rent (flat)");
    }

    #[tokio::test]
    async fn create_many_rolls_back_the_whole_batch() {
        let harness = Harness::new(seeded());
        let before = harness.snapshot();
        harness.transport.fail_next(
            Resource::Transaction,
            Operation::CreateMany,
            RemoteErrorKind::Server { status: 500 },
        );
        let batch = vec![tx("t1", "Coffee", "a", "b"), tx("t2", "Tea", "c", "b")];
        let report = harness.pipeline.run(CreateMany(batch)).await.unwrap();
        assert!(!report.is_applied());
        assert_eq!(harness.snapshot(), before);
    }

    #[tokio::test]
    async fn create_many_indexes_every_item() {
        let harness = Harness::new(seeded());
        let batch = vec![tx("t1", "Coffee", "a", "b"), tx("t2", "Tea", "c", "b")];
        let report = harness.pipeline.run(CreateMany(batch)).await.unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        let state = harness.snapshot();
        assert!(state.indexes_consistent());
        assert_eq!(state.balance(&AccountId::from("b")), Some(1_000));
        assert_eq!(
            state.indexes.text.search_words("tea"),
            BTreeSet::from([TransactionId::from("t2")])
        );
    }

    #[tokio::test]
    async fn create_many_rejects_duplicates_in_batch() {
        let harness = Harness::new(seeded());
        let batch = vec![tx("t1", "Coffee", "a", "b"), tx("t1", "Tea", "c", "b")];
        let err = harness.pipeline.run(CreateMany(batch)).await.unwrap_err();
        assert!(matches!(err, ValidationError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn replace_all_swaps_store_and_uploads() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let harness = Harness::new(state);

        let mut next = EntityStore::default();
        let _old = next.accounts.add(account("x", AccountType::Asset));
        let _old = next.accounts.add(account("y", AccountType::Expense));
        let _old = next.transactions.add(tx("t9", "Books", "x", "y"));

        let report = harness.pipeline.run(ReplaceAll(next.clone())).await.unwrap();
        assert_eq!(report.outcome, Outcome::Succeeded);
        let state = harness.snapshot();
        assert_eq!(state.store, next);
        assert!(state.indexes_consistent());
        assert!(harness.transport.contains(Resource::Transaction, "t9"));
    }

    #[tokio::test]
    async fn failed_replace_all_restores_previous_store() {
        let mut state = seeded();
        let _old = state.insert(tx("t1", "Coffee", "a", "b"));
        let harness = Harness::new(state);
        let before = harness.snapshot();
        harness.transport.fail_next(
            Resource::Account,
            Operation::CreateMany,
            RemoteErrorKind::Unavailable,
        );

        let mut next = EntityStore::default();
        let _old = next.accounts.add(account("x", AccountType::Asset));
        let report = harness.pipeline.run(ReplaceAll(next)).await.unwrap();
        assert!(report.failure().unwrap().partial);
        assert_eq!(harness.snapshot(), before);
    }
}
