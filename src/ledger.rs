//! High-level ledger facade.
//!
//! [`Ledger`] owns the shared state and the mutation pipeline. It boots
//! from the remote service, answers queries from the store and its
//! derived indexes, routes every change through the pipeline, realizes
//! recurring transactions and moves whole snapshots in and out of local
//! storage and backups.

use alloc::collections::BTreeSet;
use alloc::sync::Arc;

use chrono::{Months, NaiveDate};

use crate::backup::Backup;
use crate::encryption::Cipher;
use crate::error::{LedgerError, Result};
use crate::index::normalize;
use crate::models::{
    Account, AccountId, AccountView, ImportProfile, ImportProfileMapping, ImportProfileView,
    ImportRule, ImportRuleAction, ImportRuleCondition, ImportRuleView, Preference, PreferenceId,
    RecurringTransaction, Resource, Transaction, TransactionId, VirtualTransaction,
};
use crate::notify::{LogNotifier, Notifier};
use crate::pipeline::{
    Create, CreateImportProfile, CreateImportRule, CreateMany, Destroy, EffectFailure,
    MutationReport, Pipeline, ReplaceAll, ReplacePlan, Update,
};
use crate::projection::MAX_OCCURRENCES;
use crate::remote::{Remote, Transport};
use crate::state::{LedgerState, SharedState, Tracked};
use crate::storage::{PersistedState, Storage};
use crate::store::{EntityStore, Stored};
use crate::undo::{self, DestroyOutcome, DestroyTarget, Interaction, Snapshot, UndoableDestroyer};

/// How far past today the default projection window reaches.
pub const PROJECTION_MONTHS: u32 = 12;

/// Returns the default projection horizon for `today`.
#[inline]
#[must_use]
pub fn default_horizon(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_months(Months::new(PROJECTION_MONTHS))
        .unwrap_or(NaiveDate::MAX)
}

/// Outcome of a realization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RealizeReport {
    /// Concrete transactions created.
    pub created: usize,
    /// Definitions whose watermark moved to today.
    pub advanced: usize,
    /// Definitions whose creation or watermark update did not stick.
    pub failed: usize,
}

/// Outcome of [`Ledger::boot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    /// Records fetched per resource.
    pub fetched: Vec<(Resource, usize)>,
    /// Realization run after landing the data.
    pub realization: RealizeReport,
}

/// Builder for constructing a [`Ledger`].
#[derive(Debug)]
pub struct LedgerBuilder<T> {
    /// Remote transport.
    transport: Option<T>,
    /// Field and backup encryption.
    cipher: Option<Arc<dyn Cipher>>,
    /// User notification sink.
    notifier: Option<Arc<dyn Notifier>>,
}

impl<T: Transport> LedgerBuilder<T> {
    /// Sets the remote transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Enables field encryption of remote payloads and backups.
    #[inline]
    #[must_use]
    pub fn cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Sets where rollback and restore notices go.
    ///
    /// Defaults to [`LogNotifier`].
    #[inline]
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Builds the ledger with empty state.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingTransport`] if no transport was set.
    #[inline]
    pub fn build(self) -> Result<Ledger<T>> {
        let transport = self.transport.ok_or(LedgerError::MissingTransport)?;
        let remote = match self.cipher {
            Some(cipher) => Remote::encrypted(transport, cipher),
            None => Remote::new(transport),
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        Ok(Ledger {
            pipeline: Pipeline::new(SharedState::default(), remote, notifier),
        })
    }
}

/// Client-side ledger state with optimistic remote sync.
///
/// Use [`Ledger::builder()`] to construct an instance.
#[derive(Debug)]
pub struct Ledger<T> {
    /// Runs every mutation.
    pipeline: Pipeline<T>,
}

impl<T: Transport> Ledger<T> {
    /// Creates a new builder for configuring the ledger.
    #[inline]
    #[must_use]
    pub const fn builder() -> LedgerBuilder<T> {
        LedgerBuilder {
            transport: None,
            cipher: None,
            notifier: None,
        }
    }

    /// Returns the mutation pipeline.
    #[inline]
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline<T> {
        &self.pipeline
    }

    /// Returns a copy of the current state.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> LedgerState {
        self.pipeline.state().snapshot()
    }

    /// Runs `f` against the current state.
    fn read<R, F: FnOnce(&LedgerState) -> R>(&self, f: F) -> R {
        self.pipeline.state().with_lock(|state| f(state))
    }

    /// Returns the configured cipher.
    fn cipher(&self) -> Option<&dyn Cipher> {
        self.pipeline.remote().cipher().map(Arc::as_ref)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Fetches every resource, lands it in the store, realizes recurring
    /// transactions and projects the default horizon.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Remote`] if any fetch fails; local state is
    /// left untouched in that case.
    #[tracing::instrument(skip_all, fields(today = %today))]
    pub async fn boot(&self, today: NaiveDate) -> Result<BootReport> {
        let remote = self.pipeline.remote();
        let mut store = EntityStore::default();
        let fetched = vec![
            fetch::<Account, T>(remote, &mut store).await?,
            fetch::<Transaction, T>(remote, &mut store).await?,
            fetch::<RecurringTransaction, T>(remote, &mut store).await?,
            fetch::<ImportRule, T>(remote, &mut store).await?,
            fetch::<ImportRuleAction, T>(remote, &mut store).await?,
            fetch::<ImportRuleCondition, T>(remote, &mut store).await?,
            fetch::<ImportProfile, T>(remote, &mut store).await?,
            fetch::<ImportProfileMapping, T>(remote, &mut store).await?,
            fetch::<Preference, T>(remote, &mut store).await?,
        ];
        self.pipeline.state().with_lock(|state| {
            state.reset();
            let _previous = state.replace_all(store);
        });
        let realization = self.realize(today).await;
        self.project(default_horizon(today));
        tracing::info!(
            transactions = self.read(|state| state.store.transactions.len()),
            realized = realization.created,
            "boot complete"
        );
        Ok(BootReport {
            fetched,
            realization,
        })
    }

    /// Drops all local state, as on logout.
    #[inline]
    pub fn reset(&self) {
        self.pipeline.state().with_lock(LedgerState::reset);
        tracing::debug!("ledger state reset");
    }

    /// Regenerates virtual transactions for the window ending at `until`.
    #[inline]
    pub fn project(&self, until: NaiveDate) {
        self.pipeline
            .state()
            .with_lock(|state| state.projector.add_many(until, &state.store));
    }

    /// Creates concrete transactions for every due occurrence and moves
    /// each definition's watermark to `today`.
    ///
    /// An occurrence is due when it falls after the watermark, on or
    /// before `today`, and no transaction linked to the definition exists
    /// on that date. Running twice on the same day creates nothing the
    /// second time. A definition whose creation rolls back keeps its
    /// watermark so the next run retries it.
    #[tracing::instrument(skip_all, fields(today = %today))]
    pub async fn realize(&self, today: NaiveDate) -> RealizeReport {
        let definitions: Vec<RecurringTransaction> = self.read(|state| {
            state
                .store
                .recurring_transactions
                .values()
                .cloned()
                .collect()
        });
        let mut report = RealizeReport::default();
        for recurring in definitions {
            let due = self.read(|state| due_occurrences(&state.store, &recurring, today));
            if !due.is_empty() {
                let count = due.len();
                match self.pipeline.run(CreateMany(due)).await {
                    Ok(run) if run.is_applied() => report.created += count,
                    Ok(_) => {
                        report.failed += 1;
                        continue;
                    }
                    Err(err) => {
                        tracing::warn!(recurring = %recurring.id, error = %err, "cannot realize");
                        report.failed += 1;
                        continue;
                    }
                }
            }
            let current = self.read(|state| {
                state
                    .get::<RecurringTransaction>(&recurring.id)
                    .filter(|item| item.last_realized_date.is_none_or(|mark| mark < today))
                    .cloned()
            });
            let Some(mut advanced) = current else {
                continue;
            };
            advanced.last_realized_date = Some(today);
            match self.pipeline.run(Update(advanced)).await {
                Ok(run) if run.is_applied() => report.advanced += 1,
                Ok(_) => report.failed += 1,
                Err(err) => {
                    tracing::warn!(
                        recurring = %recurring.id,
                        error = %err,
                        "cannot advance watermark"
                    );
                    report.failed += 1;
                }
            }
        }
        tracing::debug!(
            created = report.created,
            advanced = report.advanced,
            failed = report.failed,
            "realization finished"
        );
        report
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Returns every account with its balance, ordered by name.
    #[must_use]
    pub fn accounts(&self) -> Vec<AccountView> {
        let mut views: Vec<AccountView> = self.read(|state| {
            state
                .store
                .accounts
                .values()
                .filter_map(|account| state.account_view(&account.id))
                .collect()
        });
        views.sort_by(|left, right| {
            left.account
                .name
                .cmp(&right.account.name)
                .then_with(|| left.account.id.cmp(&right.account.id))
        });
        views
    }

    /// Returns one account with its balance.
    #[inline]
    #[must_use]
    pub fn account(&self, id: &AccountId) -> Option<AccountView> {
        self.read(|state| state.account_view(id))
    }

    /// Returns an account's current balance.
    #[inline]
    #[must_use]
    pub fn balance(&self, id: &AccountId) -> Option<i64> {
        self.read(|state| state.balance(id))
    }

    /// Returns an account's balance on `on`, including projected
    /// transactions. Extends the projection window if it ends earlier.
    #[must_use]
    pub fn projected_balance(&self, id: &AccountId, on: NaiveDate) -> Option<i64> {
        self.pipeline.state().with_lock(|state| {
            if state.projector.horizon().is_none_or(|until| until < on) {
                state.projector.add_many(on, &state.store);
            }
            state.projected_balance(id, on)
        })
    }

    /// Looks up a transaction.
    #[inline]
    #[must_use]
    pub fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.read(|state| state.get::<Transaction>(id).cloned())
    }

    /// Returns transactions dated within `[from, to]`, oldest first.
    #[must_use]
    pub fn transactions_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<Transaction> {
        self.read(|state| {
            state
                .indexes
                .date
                .between(from, to)
                .iter()
                .filter_map(|id| state.store.transactions.get(id))
                .cloned()
                .collect()
        })
    }

    /// Finds transactions by description, most recent first.
    ///
    /// Combines descriptions starting with the query (found through the
    /// bigram index) with descriptions holding a word starting with each
    /// query word.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Transaction> {
        let needle = normalize(query);
        if needle.is_empty() {
            return Vec::new();
        }
        let mut found: Vec<Transaction> = self.read(|state| {
            let text = &state.indexes.text;
            let mut ids: BTreeSet<TransactionId> = text
                .search_bigrams(&needle)
                .into_iter()
                .filter(|id| {
                    state
                        .store
                        .transactions
                        .get(id)
                        .is_some_and(|item| normalize(&item.description).starts_with(&needle))
                })
                .collect();
            ids.extend(text.search_words(&needle));
            ids.iter()
                .filter_map(|id| state.store.transactions.get(id))
                .cloned()
                .collect()
        });
        found.sort_by(|left, right| {
            right
                .date
                .cmp(&left.date)
                .then_with(|| left.id.cmp(&right.id))
        });
        found
    }

    /// Returns every recurring transaction definition.
    #[must_use]
    pub fn recurring_transactions(&self) -> Vec<RecurringTransaction> {
        self.read(|state| state.store.recurring_transactions.values().cloned().collect())
    }

    /// Returns projected transactions dated on or before `until`,
    /// extending the projection window if it ends earlier.
    #[must_use]
    pub fn virtual_transactions(&self, until: NaiveDate) -> Vec<VirtualTransaction> {
        self.pipeline.state().with_lock(|state| {
            if state.projector.horizon().is_none_or(|horizon| horizon < until) {
                state.projector.add_many(until, &state.store);
            }
            state.projector.until(until).into_iter().cloned().collect()
        })
    }

    /// Returns every import rule with its actions and conditions.
    #[must_use]
    pub fn import_rules(&self) -> Vec<ImportRuleView> {
        self.read(|state| {
            state
                .store
                .import_rules
                .values()
                .map(|rule| ImportRuleView {
                    rule: rule.clone(),
                    actions: state.store.rule_actions(&rule.id).cloned().collect(),
                    conditions: state.store.rule_conditions(&rule.id).cloned().collect(),
                })
                .collect()
        })
    }

    /// Returns every import profile with its mappings.
    #[must_use]
    pub fn import_profiles(&self) -> Vec<ImportProfileView> {
        self.read(|state| {
            state
                .store
                .import_profiles
                .values()
                .map(|profile| ImportProfileView {
                    profile: profile.clone(),
                    mappings: state.store.profile_mappings(&profile.id).cloned().collect(),
                })
                .collect()
        })
    }

    /// Returns the value of a preference.
    #[inline]
    #[must_use]
    pub fn preference(&self, key: &str) -> Option<String> {
        self.read(|state| state.store.preference(key).map(|item| item.value.clone()))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Creates one entity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the Commit is rejected.
    #[inline]
    pub async fn create<E: Tracked>(&self, item: E) -> Result<MutationReport<E>> {
        Ok(self.pipeline.run(Create(item)).await?)
    }

    /// Creates a batch of entities of one type.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if any item is rejected.
    #[inline]
    pub async fn create_many<E: Tracked>(&self, items: Vec<E>) -> Result<MutationReport<Vec<E>>> {
        Ok(self.pipeline.run(CreateMany(items)).await?)
    }

    /// Replaces a stored entity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the Commit is rejected.
    #[inline]
    pub async fn update<E: Tracked>(&self, item: E) -> Result<MutationReport<E>> {
        Ok(self.pipeline.run(Update(item)).await?)
    }

    /// Removes one entity that nothing references.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the entity is missing or
    /// still referenced.
    #[inline]
    pub async fn destroy<E: Tracked>(&self, id: E::Id) -> Result<MutationReport<E>> {
        Ok(self.pipeline.run(Destroy::<E>(id)).await?)
    }

    /// Creates a recurring transaction and realizes its due occurrences.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the Commit is rejected.
    pub async fn create_recurring(
        &self,
        item: RecurringTransaction,
        today: NaiveDate,
    ) -> Result<MutationReport<RecurringTransaction>> {
        let report = self.pipeline.run(Create(item)).await?;
        if report.is_applied() {
            let _realized = self.realize(today).await;
        }
        Ok(report)
    }

    /// Creates an import rule with its actions and conditions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the rule or a child is
    /// rejected.
    #[inline]
    pub async fn create_import_rule(
        &self,
        view: ImportRuleView,
    ) -> Result<MutationReport<ImportRuleView>> {
        Ok(self.pipeline.run(CreateImportRule(view)).await?)
    }

    /// Creates an import profile with its mappings.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the profile or a mapping is
    /// rejected.
    #[inline]
    pub async fn create_import_profile(
        &self,
        view: ImportProfileView,
    ) -> Result<MutationReport<ImportProfileView>> {
        Ok(self.pipeline.run(CreateImportProfile(view)).await?)
    }

    /// Sets a preference, creating it if the key is new.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the key is empty.
    pub async fn set_preference(
        &self,
        key: &str,
        value: &str,
    ) -> Result<MutationReport<Preference>> {
        let existing = self.read(|state| state.store.preference(key).map(|item| item.id.clone()));
        let preference = Preference {
            id: existing.clone().unwrap_or_else(PreferenceId::random),
            key: key.to_owned(),
            value: value.to_owned(),
        };
        match existing {
            Some(_) => self.update(preference).await,
            None => self.create(preference).await,
        }
    }

    /// Removes a preference; returns `None` if the key is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the Commit is rejected.
    pub async fn remove_preference(&self, key: &str) -> Result<Option<MutationReport<Preference>>> {
        let Some(id) = self.read(|state| state.store.preference(key).map(|item| item.id.clone()))
        else {
            return Ok(None);
        };
        Ok(Some(self.destroy::<Preference>(id).await?))
    }

    /// Destroys `target` and everything it owns without prompting.
    ///
    /// Accounts take their transactions with them after their import
    /// rule actions are detached. Recurring transactions unlink the
    /// transactions realized from them.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if a Commit is rejected.
    #[inline]
    pub async fn destroy_target(
        &self,
        target: &DestroyTarget,
    ) -> Result<core::result::Result<Snapshot, EffectFailure>> {
        Ok(undo::destroy_target(&self.pipeline, target).await?)
    }

    /// Destroys `target` behind a confirmation and an undo window.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if a Commit is rejected.
    #[inline]
    pub async fn destroy_with_undo<I: Interaction>(
        &self,
        destroyer: &UndoableDestroyer<I>,
        target: DestroyTarget,
    ) -> Result<DestroyOutcome> {
        Ok(destroyer.destroy(&self.pipeline, target).await?)
    }

    // ── Persistence and backups ─────────────────────────────────────

    /// Saves the store and its indexes.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    #[tracing::instrument(skip_all)]
    pub async fn save_to<S: Storage>(&self, storage: &S) -> Result<()> {
        let persisted = self.read(PersistedState::capture);
        storage.save(&persisted).await
    }

    /// Replaces local state with the last saved snapshot and projects the
    /// default horizon. Returns `false` if nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    #[tracing::instrument(skip_all, fields(today = %today))]
    pub async fn load_from<S: Storage>(&self, storage: &S, today: NaiveDate) -> Result<bool> {
        let Some(persisted) = storage.load().await? else {
            return Ok(false);
        };
        let mut restored = persisted.into_state();
        restored.projector.add_many(default_horizon(today), &restored.store);
        self.pipeline.state().with_lock(|state| *state = restored);
        Ok(true)
    }

    /// Serializes a backup of the store, encrypted when a cipher is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Serialization`] or
    /// [`LedgerError::Encryption`].
    #[inline]
    pub fn export_backup(&self) -> Result<String> {
        let store = self.read(|state| state.store.clone());
        Backup::new(store).export(self.cipher())
    }

    /// Replaces the whole store with a backup, locally and remotely.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backup`], [`LedgerError::Serialization`] or
    /// [`LedgerError::Encryption`] if the file cannot be read, or
    /// [`LedgerError::Validation`] if its contents are inconsistent.
    #[tracing::instrument(skip_all)]
    pub async fn import_backup(&self, text: &str) -> Result<MutationReport<ReplacePlan>> {
        let backup = Backup::import(text, self.cipher())?;
        Ok(self.pipeline.run(ReplaceAll(backup.resources)).await?)
    }
}

/// Fetches one resource into `store`.
async fn fetch<E: Stored, T: Transport>(
    remote: &Remote<T>,
    store: &mut EntityStore,
) -> Result<(Resource, usize)> {
    let items = remote.find::<E>().await?;
    let count = items.len();
    let _previous = E::collection_mut(store).set(items);
    Ok((E::RESOURCE, count))
}

/// Builds the transactions due for `recurring` up to `today`.
fn due_occurrences(
    store: &EntityStore,
    recurring: &RecurringTransaction,
    today: NaiveDate,
) -> Vec<Transaction> {
    let realized: BTreeSet<NaiveDate> = store
        .linked_transactions(&recurring.id)
        .map(|item| item.date)
        .collect();
    let watermark = recurring.last_realized_date;
    recurring
        .recurrence
        .occurrences_trusted()
        .take_while(|date| *date <= today)
        .skip_while(|date| watermark.is_some_and(|mark| *date <= mark))
        .take(MAX_OCCURRENCES)
        .filter(|date| !realized.contains(date))
        .map(|date| recurring.realize(date))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::error::RemoteErrorKind;
    use crate::models::{
        AccountType, Frequency, ImportRuleActionId, ImportRuleId, RecurrenceEnd, RecurrenceRule,
        RecurringTransactionId, RuleAction, TransactionType,
    };
    use crate::notify::RecordingNotifier;
    use crate::remote::{InMemoryTransport, Operation};
    use crate::storage::InMemoryStorage;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn json<E: serde::Serialize>(item: &E) -> Value {
        serde_json::to_value(item).unwrap()
    }

    fn account(id: &str, kind: AccountType, opening: i64) -> Account {
        Account {
            id: AccountId::from(id),
            name: id.to_owned(),
            kind,
            opening_balance: opening,
        }
    }

    fn purchase(id: &str, description: &str, day: u32) -> Transaction {
        Transaction {
            id: TransactionId::from(id),
            amount: 250,
            date: date(2024, 1, day),
            description: description.to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("bank"),
            debit_account_id: AccountId::from("food"),
            recurring_transaction_id: None,
        }
    }

    fn rent() -> RecurringTransaction {
        RecurringTransaction {
            id: RecurringTransactionId::from("rent"),
            amount: 1_000,
            description: "Rent".to_owned(),
            kind: TransactionType::Expense,
            credit_account_id: AccountId::from("bank"),
            debit_account_id: AccountId::from("housing"),
            recurrence: RecurrenceRule {
                interval: 1,
                frequency: Frequency::Month,
                anchor: None,
                start_date: date(2024, 1, 15),
                end: RecurrenceEnd::Never,
            },
            last_realized_date: None,
        }
    }

    fn seeded_transport() -> InMemoryTransport {
        let transport = InMemoryTransport::new();
        transport.seed(
            Resource::Account,
            [
                json(&account("bank", AccountType::Asset, 100_000)),
                json(&account("food", AccountType::Expense, 0)),
                json(&account("housing", AccountType::Expense, 0)),
            ],
        );
        transport.seed(Resource::RecurringTransaction, [json(&rent())]);
        transport
    }

    fn ledger(transport: &InMemoryTransport) -> (Ledger<InMemoryTransport>, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let ledger = Ledger::builder()
            .transport(transport.clone())
            .notifier(Arc::new(notifier.clone()))
            .build()
            .unwrap();
        (ledger, notifier)
    }

    #[test]
    fn builder_requires_transport() {
        let result = Ledger::<InMemoryTransport>::builder().build();
        assert!(matches!(result, Err(LedgerError::MissingTransport)));
    }

    #[tokio::test]
    async fn boot_fetches_realizes_and_projects() {
        let transport = seeded_transport();
        let (ledger, _notifier) = ledger(&transport);
        let today = date(2024, 3, 20);

        let report = ledger.boot(today).await.unwrap();

        assert!(report.fetched.contains(&(Resource::Account, 3)));
        assert!(report.fetched.contains(&(Resource::RecurringTransaction, 1)));
        assert_eq!(report.realization.created, 3);
        assert_eq!(report.realization.advanced, 1);
        assert_eq!(transport.records(Resource::Transaction).len(), 3);

        let bank = AccountId::from("bank");
        assert_eq!(ledger.balance(&bank), Some(97_000));
        assert_eq!(
            ledger.recurring_transactions()[0].last_realized_date,
            Some(today)
        );
        let virtuals = ledger.virtual_transactions(default_horizon(today));
        assert_eq!(virtuals.len(), 12);
        assert_eq!(virtuals[0].date, date(2024, 4, 15));
        assert_eq!(ledger.projected_balance(&bank, date(2024, 6, 30)), Some(94_000));
        assert!(ledger.snapshot().indexes_consistent());
    }

    #[tokio::test]
    async fn realize_twice_is_idempotent() {
        let transport = seeded_transport();
        let (ledger, _notifier) = ledger(&transport);
        let today = date(2024, 3, 20);
        let _report = ledger.boot(today).await.unwrap();
        let calls = transport.calls().len();

        let again = ledger.realize(today).await;

        assert_eq!(again, RealizeReport::default());
        assert_eq!(transport.calls().len(), calls);
        assert_eq!(ledger.snapshot().store.transactions.len(), 3);
    }

    #[tokio::test]
    async fn realize_skips_dates_already_linked() {
        let transport = seeded_transport();
        let existing = rent().realize(date(2024, 2, 15));
        transport.seed(Resource::Transaction, [json(&existing)]);
        let (ledger, _notifier) = ledger(&transport);

        let report = ledger.boot(date(2024, 3, 20)).await.unwrap();

        assert_eq!(report.realization.created, 2);
        let dates: BTreeSet<NaiveDate> = ledger
            .snapshot()
            .store
            .transactions
            .values()
            .map(|item| item.date)
            .collect();
        assert_eq!(dates.len(), 3);
    }

    #[tokio::test]
    async fn failed_realization_keeps_watermark() {
        let transport = seeded_transport();
        let (ledger, notifier) = ledger(&transport);
        transport.fail_next(
            Resource::Transaction,
            Operation::CreateMany,
            RemoteErrorKind::Unavailable,
        );
        let today = date(2024, 3, 20);

        let report = ledger.boot(today).await.unwrap();

        assert_eq!(report.realization.failed, 1);
        assert_eq!(report.realization.created, 0);
        assert!(ledger.snapshot().store.transactions.is_empty());
        assert_eq!(ledger.recurring_transactions()[0].last_realized_date, None);
        assert_eq!(notifier.take().len(), 1);

        let retry = ledger.realize(today).await;
        assert_eq!(retry.created, 3);
        assert_eq!(retry.advanced, 1);
    }

    #[tokio::test]
    async fn old_daily_rule_realizes_past_its_watermark() {
        let transport = InMemoryTransport::new();
        transport.seed(
            Resource::Account,
            [
                json(&account("bank", AccountType::Asset, 100_000)),
                json(&account("housing", AccountType::Expense, 0)),
            ],
        );
        let mut daily = rent();
        daily.recurrence.frequency = Frequency::Day;
        daily.recurrence.start_date = date(1996, 1, 1);
        daily.last_realized_date = Some(date(2026, 10, 1));
        transport.seed(Resource::RecurringTransaction, [json(&daily)]);
        let (ledger, _notifier) = ledger(&transport);
        let today = date(2026, 10, 5);

        let report = ledger.boot(today).await.unwrap();

        assert_eq!(report.realization.created, 4);
        assert_eq!(transport.records(Resource::Transaction).len(), 4);
        assert_eq!(
            ledger.recurring_transactions()[0].last_realized_date,
            Some(today)
        );
        assert!(!ledger.virtual_transactions(date(2026, 10, 31)).is_empty());
    }

    #[tokio::test]
    async fn boot_failure_leaves_state_untouched() {
        let transport = seeded_transport();
        let (ledger, _notifier) = ledger(&transport);
        let _report = ledger.boot(date(2024, 3, 20)).await.unwrap();
        let before = ledger.snapshot();
        transport.fail_next(Resource::Preference, Operation::Find, RemoteErrorKind::Timeout);

        let err = ledger.boot(date(2024, 3, 21)).await.unwrap_err();

        assert!(matches!(err, LedgerError::Remote(_)));
        assert_eq!(ledger.snapshot(), before);
    }

    #[tokio::test]
    async fn search_combines_prefix_and_words() {
        let transport = seeded_transport();
        transport.seed(
            Resource::Transaction,
            [
                json(&purchase("t1", "Coffee beans", 2)),
                json(&purchase("t2", "Iced coffee", 5)),
                json(&purchase("t3", "Cookies", 3)),
            ],
        );
        let (ledger, _notifier) = ledger(&transport);
        let _report = ledger.boot(date(2024, 1, 10)).await.unwrap();

        let ids = |query: &str| -> Vec<String> {
            ledger
                .search(query)
                .into_iter()
                .map(|item| item.id.into_inner())
                .collect()
        };
        assert_eq!(ids("co"), ["t2", "t3", "t1"]);
        assert_eq!(ids("c"), ["t2", "t3", "t1"]);
        assert_eq!(ids("i"), ["t2"]);
        assert_eq!(ids("coffee b"), ["t1"]);
        assert_eq!(ids("ICED"), ["t2"]);
        assert!(ids("   ").is_empty());
    }

    #[tokio::test]
    async fn transactions_between_uses_date_index() {
        let transport = seeded_transport();
        transport.seed(
            Resource::Transaction,
            [
                json(&purchase("t1", "Bread", 2)),
                json(&purchase("t2", "Milk", 5)),
                json(&purchase("t3", "Eggs", 9)),
            ],
        );
        let (ledger, _notifier) = ledger(&transport);
        let _report = ledger.boot(date(2024, 1, 10)).await.unwrap();

        let found: Vec<TransactionId> = ledger
            .transactions_between(date(2024, 1, 3), date(2024, 1, 9))
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(found, [TransactionId::from("t2"), TransactionId::from("t3")]);
    }

    #[tokio::test]
    async fn preferences_set_and_remove() {
        let transport = InMemoryTransport::new();
        let (ledger, _notifier) = ledger(&transport);

        let first = ledger.set_preference("currency", "EUR").await.unwrap();
        let second = ledger.set_preference("currency", "USD").await.unwrap();

        assert_eq!(first.value.id, second.value.id);
        assert_eq!(ledger.preference("currency").as_deref(), Some("USD"));
        assert_eq!(transport.records(Resource::Preference).len(), 1);

        assert!(ledger.remove_preference("currency").await.unwrap().is_some());
        assert!(ledger.remove_preference("currency").await.unwrap().is_none());
        assert!(ledger.preference("currency").is_none());
        assert!(transport.records(Resource::Preference).is_empty());
    }

    #[tokio::test]
    async fn create_recurring_realizes_due_dates() {
        let transport = seeded_transport();
        let (ledger, _notifier) = ledger(&transport);
        let today = date(2024, 3, 20);
        let _report = ledger.boot(today).await.unwrap();

        let mut weekly = rent();
        weekly.id = RecurringTransactionId::from("groceries");
        weekly.debit_account_id = AccountId::from("food");
        weekly.recurrence.frequency = Frequency::Week;
        weekly.recurrence.start_date = date(2024, 3, 6);
        let report = ledger.create_recurring(weekly.clone(), today).await.unwrap();

        assert!(report.is_applied());
        let linked = ledger
            .snapshot()
            .store
            .linked_transactions(&weekly.id)
            .count();
        assert_eq!(linked, 3);
    }

    #[tokio::test]
    async fn destroy_account_detaches_rule_actions() {
        let transport = seeded_transport();
        transport.seed(Resource::Transaction, [json(&purchase("t1", "Bread", 2))]);
        transport.seed(
            Resource::ImportRule,
            [json(&ImportRule {
                id: ImportRuleId::from("r1"),
                name: "Groceries".to_owned(),
            })],
        );
        transport.seed(
            Resource::ImportRuleAction,
            [json(&ImportRuleAction {
                id: ImportRuleActionId::from("a1"),
                import_rule_id: ImportRuleId::from("r1"),
                action: RuleAction::SetDebitAccount {
                    account_id: AccountId::from("food"),
                },
            })],
        );
        let (ledger, _notifier) = ledger(&transport);
        let _report = ledger.boot(date(2024, 1, 10)).await.unwrap();

        let food = AccountId::from("food");
        let snapshot = ledger
            .destroy_target(&DestroyTarget::Account(food.clone()))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            snapshot,
            Snapshot::Account { ref removed, ref detached }
                if removed.transactions.len() == 1 && detached.len() == 1
        ));
        assert!(ledger.account(&food).is_none());
        assert_eq!(ledger.import_rules()[0].actions.len(), 0);
        assert!(!transport.contains(Resource::ImportRuleAction, "a1"));
        assert!(!transport.contains(Resource::Account, "food"));
    }

    #[tokio::test]
    async fn plain_destroy_refuses_referenced_account() {
        let transport = seeded_transport();
        let (ledger, _notifier) = ledger(&transport);
        let _report = ledger.boot(date(2024, 1, 10)).await.unwrap();

        let err = ledger
            .destroy::<Account>(AccountId::from("housing"))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(ledger.account(&AccountId::from("housing")).is_some());
    }

    #[tokio::test]
    async fn storage_round_trip_restores_projection() {
        let transport = seeded_transport();
        let (ledger, _notifier) = ledger(&transport);
        let today = date(2024, 3, 20);
        let _report = ledger.boot(today).await.unwrap();
        let storage = InMemoryStorage::new();
        ledger.save_to(&storage).await.unwrap();

        let (restored, _notifier) = self::ledger(&InMemoryTransport::new());
        assert!(restored.load_from(&storage, today).await.unwrap());

        assert_eq!(restored.snapshot(), ledger.snapshot());
        assert!(
            !self::ledger(&InMemoryTransport::new())
                .0
                .load_from(&InMemoryStorage::new(), today)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn backup_import_replaces_local_and_remote() {
        let source = seeded_transport();
        let (ledger, _notifier) = ledger(&source);
        let _report = ledger.boot(date(2024, 3, 20)).await.unwrap();
        let text = ledger.export_backup().unwrap();

        let target = InMemoryTransport::new();
        target.seed(
            Resource::Account,
            [json(&account("old", AccountType::Asset, 0))],
        );
        let (fresh, _notifier) = self::ledger(&target);
        let _report = fresh.boot(date(2024, 3, 20)).await.unwrap();

        let report = fresh.import_backup(&text).await.unwrap();

        assert!(report.is_applied());
        assert_eq!(fresh.snapshot().store, ledger.snapshot().store);
        assert!(!target.contains(Resource::Account, "old"));
        assert_eq!(target.records(Resource::Transaction).len(), 3);
        assert_eq!(target.records(Resource::Account).len(), 3);
    }

    #[tokio::test]
    async fn reset_drops_everything() {
        let transport = seeded_transport();
        let (ledger, _notifier) = ledger(&transport);
        let _report = ledger.boot(date(2024, 3, 20)).await.unwrap();

        ledger.reset();

        assert_eq!(ledger.snapshot(), LedgerState::default());
        assert!(ledger.accounts().is_empty());
    }
}
