//! The optimistic mutation pipeline.
//!
//! Every mutating operation runs three phases:
//!
//! 1. **Commit**: validated and applied to the [`LedgerState`] under its
//!    lock in one synchronous step. Derived indexes and projections are
//!    updated by the same step. A validation failure returns to the
//!    caller before anything changed.
//! 2. **Effect**: the matching remote call, awaited after the lock is
//!    released.
//! 3. **Rollback**: on Effect failure the Commit is reversed under the
//!    lock and the user is notified once. Failures the mutation declares
//!    as reconciling (a create that already exists remotely, a removal of
//!    something already gone) skip the rollback.

mod mutations;
mod outcome;

use alloc::sync::Arc;
use core::future::Future;

pub use mutations::{
    AccountSnapshot, Create, CreateImportProfile, CreateImportRule, CreateMany, Destroy,
    DestroyAccount, DestroyImportProfile, DestroyImportRule, DestroyRecurringTransaction,
    RecurringSnapshot, ReplaceAll, ReplacePlan, Update,
};
pub use outcome::{
    EffectFailure, EffectOutcome, MutationReport, MutationState, Outcome,
};

use crate::error::ValidationError;
use crate::notify::{Notification, Notifier};
use crate::remote::{Remote, Transport};
use crate::state::{LedgerState, SharedState};

/// A mutation with Commit, Effect and Rollback bodies.
pub trait Mutation: Send + Sync {
    /// Value produced by the Commit and handed to the Effect.
    type Output: Send + Sync;
    /// Everything needed to reverse the Commit.
    type Rollback: Send;

    /// Short description used in logs and notifications, such as
    /// `create transaction t1`.
    fn describe(&self) -> String;

    /// Validates and applies the mutation.
    ///
    /// Must not change `state` when returning an error.
    ///
    /// # Errors
    ///
    /// Returns the validation failure.
    fn commit(
        &self,
        state: &mut LedgerState,
    ) -> Result<(Self::Output, Self::Rollback), ValidationError>;

    /// Sends the committed change to the remote service.
    fn effect<T: Transport>(
        &self,
        remote: &Remote<T>,
        output: &Self::Output,
    ) -> impl Future<Output = EffectOutcome> + Send;

    /// Returns `true` if this failure means the remote side already
    /// matches the committed state.
    #[inline]
    fn suppresses(&self, _failure: &EffectFailure) -> bool {
        false
    }

    /// Reverses the Commit. Does nothing where state already matches
    /// the pre-Commit shape.
    fn rollback(&self, state: &mut LedgerState, rollback: Self::Rollback);
}

/// Runs mutations against shared state and a remote service.
#[derive(Debug)]
pub struct Pipeline<T> {
    /// State mutated by Commits and Rollbacks.
    state: SharedState,
    /// Remote service for Effects.
    remote: Remote<T>,
    /// Receives rollback notices.
    notifier: Arc<dyn Notifier>,
}

impl<T: Transport> Pipeline<T> {
    /// Creates a pipeline.
    #[inline]
    #[must_use]
    pub fn new(state: SharedState, remote: Remote<T>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state,
            remote,
            notifier,
        }
    }

    /// Returns the shared state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> &SharedState {
        &self.state
    }

    /// Returns the remote service.
    #[inline]
    #[must_use]
    pub const fn remote(&self) -> &Remote<T> {
        &self.remote
    }

    /// Returns the notification sink.
    #[inline]
    #[must_use]
    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    /// Runs one mutation through Commit, Effect and, if needed, Rollback.
    ///
    /// Effect failures do not surface as errors: they are reported in the
    /// returned [`MutationReport`] and, unless reconciled, through the
    /// notifier.
    ///
    /// # Errors
    ///
    /// Returns the Commit's validation error; nothing was applied.
    #[tracing::instrument(skip_all, fields(mutation = %mutation.describe()))]
    pub async fn run<M: Mutation>(
        &self,
        mutation: M,
    ) -> Result<MutationReport<M::Output>, ValidationError> {
        tracing::debug!(state = %MutationState::PendingCommit);
        let (value, rollback) = self.state.with_lock(|state| mutation.commit(state))?;
        tracing::debug!(state = %MutationState::Committed);

        tracing::debug!(state = %MutationState::PendingEffect);
        let outcome = match mutation.effect(&self.remote, &value).await {
            EffectOutcome::Success => {
                tracing::debug!(state = %MutationState::Succeeded);
                Outcome::Succeeded
            }
            EffectOutcome::Failure(failure) if mutation.suppresses(&failure) => {
                tracing::warn!(
                    error = %failure,
                    "remote side already matches, keeping local change"
                );
                Outcome::Reconciled(failure)
            }
            EffectOutcome::Failure(failure) => {
                tracing::debug!(state = %MutationState::PendingRollback, error = %failure);
                if failure.partial {
                    tracing::warn!(
                        error = %failure,
                        "remote change partially applied; server may diverge until the next sync"
                    );
                }
                self.state
                    .with_lock(|state| mutation.rollback(state, rollback));
                self.notifier.notify(Notification::error(failure_message(
                    &mutation.describe(),
                    &failure,
                )));
                tracing::debug!(state = %MutationState::RolledBack);
                Outcome::RolledBack(failure)
            }
        };
        Ok(MutationReport { value, outcome })
    }
}

/// Builds the user-facing text for a rolled-back mutation.
fn failure_message(description: &str, failure: &EffectFailure) -> String {
    let mut message = format!("Could not {description}: {}.", failure.kind);
    if failure.partial {
        message.push_str(" Some changes may remain on the server until the next sync.");
    }
    message.push_str(" Local changes were reverted.");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;

    #[test]
    fn failure_message_mentions_partial_progress() {
        let failure = EffectFailure {
            kind: RemoteErrorKind::Timeout,
            reason: "slow".to_owned(),
            retryable: true,
            partial: true,
        };
        let message = failure_message("delete account a1", &failure);
        assert!(message.starts_with("Could not delete account a1: timed out."));
        assert!(message.contains("remain on the server"));
        assert!(message.ends_with("Local changes were reverted."));
    }
}
