//! Destroys gated by a confirmation and followed by an undo window.
//!
//! [`UndoableDestroyer`] asks its [`Interaction`] to confirm, runs the
//! destroy through the [`Pipeline`], then offers an undo. Only a
//! successful destroy is undoable. Undo re-creates the snapshot through
//! the pipeline, so a restore can itself fail and roll back.
//!
//! Deleting an account first detaches every import rule action pointing
//! at it, one pipeline run per action. The detached actions travel in
//! the snapshot so an undo re-attaches them.

use alloc::collections::BTreeSet;
use core::fmt;
use core::future::Future;
use core::time::Duration;

use tokio::sync::{Mutex, mpsc};

use crate::error::ValidationError;
use crate::models::{
    AccountId, ImportProfileId, ImportProfileView, ImportRuleAction, ImportRuleId,
    ImportRuleView, Preference, PreferenceId, RecurringTransactionId, Resource, Transaction,
    TransactionId,
};
use crate::notify::Notification;
use crate::pipeline::{
    AccountSnapshot, Create, CreateImportProfile, CreateImportRule, CreateMany, Destroy,
    DestroyAccount, DestroyImportProfile, DestroyImportRule, DestroyRecurringTransaction,
    EffectFailure, MutationReport, Outcome, Pipeline, RecurringSnapshot, Update,
};
use crate::remote::Transport;

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Go ahead.
    Confirmed,
    /// Abort without changing anything.
    Cancelled,
}

/// How an undo offer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoDecision {
    /// The user asked to restore.
    Undo,
    /// The user dismissed the offer.
    Dismissed,
    /// The offer timed out.
    Expired,
}

/// The user-facing side of an undoable destroy.
pub trait Interaction: Send + Sync + fmt::Debug {
    /// Asks the user to confirm `prompt`.
    fn confirm(&self, prompt: &str) -> impl Future<Output = Confirmation> + Send;

    /// Offers to undo what `message` describes; resolves on the first of
    /// undo, dismiss or expiry.
    fn offer_undo(&self, message: &str) -> impl Future<Output = UndoDecision> + Send;
}

/// Events a UI sends to a [`ChannelInteraction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    /// Confirm the pending prompt.
    Confirm,
    /// Cancel the pending prompt.
    Cancel,
    /// Undo the last destroy.
    Undo,
    /// Dismiss the undo offer.
    Dismiss,
}

/// An [`Interaction`] driven by events from a UI task.
///
/// Events that do not answer the current question are ignored. A closed
/// channel cancels a prompt and dismisses an offer.
#[derive(Debug)]
pub struct ChannelInteraction {
    /// Receiving half; the UI holds the sender.
    events: Mutex<mpsc::UnboundedReceiver<UserEvent>>,
    /// How long an undo offer stays open.
    window: Duration,
}

impl ChannelInteraction {
    /// Creates an interaction and the sender the UI should feed.
    #[inline]
    #[must_use]
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedSender<UserEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let interaction = Self {
            events: Mutex::new(receiver),
            window,
        };
        (interaction, sender)
    }
}

impl Interaction for ChannelInteraction {
    async fn confirm(&self, prompt: &str) -> Confirmation {
        tracing::debug!(prompt, "waiting for confirmation");
        let mut events = self.events.lock().await;
        loop {
            match events.recv().await {
                Some(UserEvent::Confirm) => return Confirmation::Confirmed,
                Some(UserEvent::Cancel) | None => return Confirmation::Cancelled,
                Some(UserEvent::Undo | UserEvent::Dismiss) => {}
            }
        }
    }

    async fn offer_undo(&self, message: &str) -> UndoDecision {
        tracing::debug!(message, window = ?self.window, "offering undo");
        let mut events = self.events.lock().await;
        let expiry = tokio::time::sleep(self.window);
        tokio::pin!(expiry);
        loop {
            tokio::select! {
                () = &mut expiry => return UndoDecision::Expired,
                event = events.recv() => match event {
                    Some(UserEvent::Undo) => return UndoDecision::Undo,
                    Some(UserEvent::Dismiss) | None => return UndoDecision::Dismissed,
                    Some(UserEvent::Confirm | UserEvent::Cancel) => {}
                },
            }
        }
    }
}

/// What to destroy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyTarget {
    /// A transaction.
    Transaction(TransactionId),
    /// An account with its transactions.
    Account(AccountId),
    /// A recurring transaction.
    RecurringTransaction(RecurringTransactionId),
    /// An import rule with its actions and conditions.
    ImportRule(ImportRuleId),
    /// An import profile with its mappings.
    ImportProfile(ImportProfileId),
    /// A preference.
    Preference(PreferenceId),
}

impl DestroyTarget {
    /// Returns the resource being destroyed.
    #[inline]
    #[must_use]
    pub const fn resource(&self) -> Resource {
        match *self {
            Self::Transaction(_) => Resource::Transaction,
            Self::Account(_) => Resource::Account,
            Self::RecurringTransaction(_) => Resource::RecurringTransaction,
            Self::ImportRule(_) => Resource::ImportRule,
            Self::ImportProfile(_) => Resource::ImportProfile,
            Self::Preference(_) => Resource::Preference,
        }
    }
}

impl fmt::Display for DestroyTarget {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resource = self.resource();
        match *self {
            Self::Transaction(ref id) => write!(f, "{resource} {id}"),
            Self::Account(ref id) => write!(f, "{resource} {id}"),
            Self::RecurringTransaction(ref id) => write!(f, "{resource} {id}"),
            Self::ImportRule(ref id) => write!(f, "{resource} {id}"),
            Self::ImportProfile(ref id) => write!(f, "{resource} {id}"),
            Self::Preference(ref id) => write!(f, "{resource} {id}"),
        }
    }
}

/// Everything a destroy removed, captured before its Commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// A removed transaction.
    Transaction(Transaction),
    /// A removed account.
    Account {
        /// The account and its transactions.
        removed: AccountSnapshot,
        /// Import rule actions detached before the account went away.
        detached: Vec<ImportRuleAction>,
    },
    /// A removed recurring transaction and the links it lost.
    RecurringTransaction(RecurringSnapshot),
    /// A removed import rule with its children.
    ImportRule(ImportRuleView),
    /// A removed import profile with its mappings.
    ImportProfile(ImportProfileView),
    /// A removed preference.
    Preference(Preference),
}

impl Snapshot {
    /// Returns the import rules whose actions were detached.
    #[must_use]
    pub fn touched_rules(&self) -> BTreeSet<ImportRuleId> {
        match *self {
            Self::Account { ref detached, .. } => detached
                .iter()
                .map(|action| action.import_rule_id.clone())
                .collect(),
            Self::Transaction(_)
            | Self::RecurringTransaction(_)
            | Self::ImportRule(_)
            | Self::ImportProfile(_)
            | Self::Preference(_) => BTreeSet::new(),
        }
    }
}

/// How an undoable destroy ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The user cancelled at the prompt; nothing changed.
    Cancelled,
    /// The destroy was rolled back; no undo was offered.
    Failed(EffectFailure),
    /// The destroy stands.
    Final(Snapshot),
    /// The destroy was undone.
    Restored(Snapshot),
    /// Undo brought back the parent but some of what it owned rolled
    /// back; the parent is in the store again.
    PartiallyRestored(Snapshot),
}

/// How far a restore got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restoration {
    /// Every step applied.
    Complete,
    /// The parent came back, a later step rolled back.
    Partial,
    /// The first step rolled back.
    Nothing,
}

impl Restoration {
    /// Maps the outcome of the steps after the parent.
    const fn after_parent(rest: bool) -> Self {
        if rest { Self::Complete } else { Self::Partial }
    }
}

/// Returns the Commit value, or the failure if the mutation rolled back.
fn applied<O>(report: MutationReport<O>) -> Result<O, EffectFailure> {
    match report.outcome {
        Outcome::Succeeded | Outcome::Reconciled(_) => Ok(report.value),
        Outcome::RolledBack(failure) => Err(failure),
    }
}

/// Detaches every import rule action that references `account`.
///
/// On the first failure the actions detached so far are re-attached and
/// the failure is returned.
///
/// # Errors
///
/// Returns a Commit validation error from any of the runs.
pub async fn detach_account_actions<T: Transport>(
    pipeline: &Pipeline<T>,
    account: &AccountId,
) -> Result<Result<Vec<ImportRuleAction>, EffectFailure>, ValidationError> {
    let referencing: Vec<ImportRuleAction> = pipeline.state().with_lock(|state| {
        state
            .store
            .import_rule_actions
            .values()
            .filter(|action| action.account() == Some(account))
            .cloned()
            .collect()
    });
    let mut detached = Vec::with_capacity(referencing.len());
    for action in referencing {
        let report = pipeline.run(Destroy::<ImportRuleAction>(action.id.clone())).await?;
        match applied(report) {
            Ok(removed) => detached.push(removed),
            Err(failure) => {
                tracing::warn!(
                    account = %account,
                    error = %failure,
                    "re-attaching detached actions"
                );
                let _restored = reattach(pipeline, &detached).await?;
                return Ok(Err(failure));
            }
        }
    }
    if !detached.is_empty() {
        tracing::debug!(account = %account, count = detached.len(), "detached import rule actions");
    }
    Ok(Ok(detached))
}

/// Re-creates detached actions whose rule still exists.
///
/// Returns `false` and tells the user which rules lost actions if any
/// re-creation rolled back.
async fn reattach<T: Transport>(
    pipeline: &Pipeline<T>,
    actions: &[ImportRuleAction],
) -> Result<bool, ValidationError> {
    let mut lost = BTreeSet::new();
    for action in actions {
        let rule_exists = pipeline
            .state()
            .with_lock(|state| state.store.import_rules.contains(&action.import_rule_id));
        if !rule_exists {
            tracing::warn!(rule = %action.import_rule_id, "rule gone, not re-attaching action");
            continue;
        }
        let report = pipeline.run(Create(action.clone())).await?;
        if !report.is_applied() {
            let _new = lost.insert(action.import_rule_id.clone());
        }
    }
    if lost.is_empty() {
        return Ok(true);
    }
    let rules = lost
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    tracing::warn!(rules = %rules, "import rule actions could not be re-attached");
    pipeline.notifier().notify(Notification::error(format!(
        "Actions of import rule(s) {rules} could not be restored."
    )));
    Ok(false)
}

/// Runs the destroy matching `target` without prompting.
///
/// Deleting an account detaches its import rule actions first and
/// re-attaches them if the account destroy rolls back. The outer result
/// carries Commit validation errors, the inner one an Effect failure.
///
/// # Errors
///
/// Returns a Commit validation error from any of the runs.
pub async fn destroy_target<T: Transport>(
    pipeline: &Pipeline<T>,
    target: &DestroyTarget,
) -> Result<Result<Snapshot, EffectFailure>, ValidationError> {
    let snapshot = match *target {
        DestroyTarget::Transaction(ref id) => applied(
            pipeline.run(Destroy::<Transaction>(id.clone())).await?,
        )
        .map(Snapshot::Transaction),
        DestroyTarget::Account(ref id) => {
            let detached = match detach_account_actions(pipeline, id).await? {
                Ok(detached) => detached,
                Err(failure) => return Ok(Err(failure)),
            };
            let report = pipeline.run(DestroyAccount(id.clone())).await;
            let removed = match report {
                Ok(report) => applied(report),
                Err(err) => {
                    let _restored = reattach(pipeline, &detached).await?;
                    return Err(err);
                }
            };
            match removed {
                Ok(removed) => Ok(Snapshot::Account { removed, detached }),
                Err(failure) => {
                    let _restored = reattach(pipeline, &detached).await?;
                    Err(failure)
                }
            }
        }
        DestroyTarget::RecurringTransaction(ref id) => applied(
            pipeline.run(DestroyRecurringTransaction(id.clone())).await?,
        )
        .map(Snapshot::RecurringTransaction),
        DestroyTarget::ImportRule(ref id) => {
            applied(pipeline.run(DestroyImportRule(id.clone())).await?)
                .map(Snapshot::ImportRule)
        }
        DestroyTarget::ImportProfile(ref id) => {
            applied(pipeline.run(DestroyImportProfile(id.clone())).await?)
                .map(Snapshot::ImportProfile)
        }
        DestroyTarget::Preference(ref id) => {
            applied(pipeline.run(Destroy::<Preference>(id.clone())).await?)
                .map(Snapshot::Preference)
        }
    };
    Ok(snapshot)
}

/// Runs destroys behind a confirmation and an undo window.
#[derive(Debug)]
pub struct UndoableDestroyer<I> {
    /// Prompts and undo offers.
    interaction: I,
}

impl<I: Interaction> UndoableDestroyer<I> {
    /// Creates a controller around an interaction.
    #[inline]
    #[must_use]
    pub const fn new(interaction: I) -> Self {
        Self { interaction }
    }

    /// Confirms, destroys and offers an undo.
    ///
    /// # Errors
    ///
    /// Returns the destroy's (or the restore's) Commit validation error.
    #[tracing::instrument(skip_all, fields(target = %target))]
    pub async fn destroy<T: Transport>(
        &self,
        pipeline: &Pipeline<T>,
        target: DestroyTarget,
    ) -> Result<DestroyOutcome, ValidationError> {
        let prompt = format!("Delete {target}?");
        if self.interaction.confirm(&prompt).await == Confirmation::Cancelled {
            tracing::debug!("destroy cancelled");
            return Ok(DestroyOutcome::Cancelled);
        }
        let snapshot = match destroy_target(pipeline, &target).await? {
            Ok(snapshot) => snapshot,
            Err(failure) => return Ok(DestroyOutcome::Failed(failure)),
        };
        let decision = self.interaction.offer_undo(&format!("Deleted {target}.")).await;
        tracing::debug!(?decision, "undo offer closed");
        if decision != UndoDecision::Undo {
            return Ok(DestroyOutcome::Final(snapshot));
        }
        match Self::restore(pipeline, &snapshot).await? {
            Restoration::Complete => {
                pipeline
                    .notifier()
                    .notify(Notification::success(format!("Restored {target}.")));
                Ok(DestroyOutcome::Restored(snapshot))
            }
            Restoration::Partial => {
                tracing::warn!("restore stopped after the parent came back");
                pipeline.notifier().notify(Notification::warning(format!(
                    "Restored {target}, but not everything it contained."
                )));
                Ok(DestroyOutcome::PartiallyRestored(snapshot))
            }
            Restoration::Nothing => {
                tracing::warn!("restore rolled back; deletion stands");
                Ok(DestroyOutcome::Final(snapshot))
            }
        }
    }

    /// Re-creates a snapshot, parent first.
    async fn restore<T: Transport>(
        pipeline: &Pipeline<T>,
        snapshot: &Snapshot,
    ) -> Result<Restoration, ValidationError> {
        let applied = match *snapshot {
            Snapshot::Transaction(ref item) => {
                pipeline.run(Create(item.clone())).await?.is_applied()
            }
            Snapshot::Account {
                ref removed,
                ref detached,
            } => {
                // Account first: its transactions reference it.
                if !pipeline.run(Create(removed.account.clone())).await?.is_applied() {
                    return Ok(Restoration::Nothing);
                }
                let members = removed.transactions.is_empty()
                    || pipeline
                        .run(CreateMany(removed.transactions.clone()))
                        .await?
                        .is_applied();
                let reattached = reattach(pipeline, detached).await?;
                return Ok(Restoration::after_parent(members && reattached));
            }
            Snapshot::RecurringTransaction(ref removed) => {
                if !pipeline.run(Create(removed.recurring.clone())).await?.is_applied() {
                    return Ok(Restoration::Nothing);
                }
                let relinked = Self::relink(pipeline, removed).await?;
                return Ok(Restoration::after_parent(relinked));
            }
            Snapshot::ImportRule(ref view) => {
                pipeline.run(CreateImportRule(view.clone())).await?.is_applied()
            }
            Snapshot::ImportProfile(ref view) => {
                pipeline.run(CreateImportProfile(view.clone())).await?.is_applied()
            }
            Snapshot::Preference(ref item) => {
                pipeline.run(Create(item.clone())).await?.is_applied()
            }
        };
        if applied {
            Ok(Restoration::Complete)
        } else {
            Ok(Restoration::Nothing)
        }
    }

    /// Points the formerly linked transactions back at the restored
    /// recurring definition.
    async fn relink<T: Transport>(
        pipeline: &Pipeline<T>,
        removed: &RecurringSnapshot,
    ) -> Result<bool, ValidationError> {
        let mut restored = true;
        for id in &removed.linked {
            let orphan = pipeline.state().with_lock(|state| {
                state
                    .get::<Transaction>(id)
                    .filter(|item| item.recurring_transaction_id.is_none())
                    .cloned()
            });
            let Some(mut item) = orphan else {
                continue;
            };
            item.recurring_transaction_id = Some(removed.recurring.id.clone());
            restored &= pipeline.run(Update(item)).await?.is_applied();
        }
        Ok(restored)
    }
}
