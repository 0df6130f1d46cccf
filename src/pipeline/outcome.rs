//! Tagged results of the pipeline's phases.

use core::fmt;

use crate::error::{RemoteError, RemoteErrorKind};
use crate::remote::BulkRemoveError;

/// Why an Effect failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFailure {
    /// Classification of the remote error.
    pub kind: RemoteErrorKind,
    /// Human readable detail.
    pub reason: String,
    /// Whether the same call could succeed if repeated.
    pub retryable: bool,
    /// Part of a multi-step Effect already reached the service before
    /// this failure, so remote state may diverge until the next full
    /// fetch.
    pub partial: bool,
}

impl EffectFailure {
    /// Marks the failure as having followed remote progress.
    #[inline]
    #[must_use]
    pub const fn after_progress(mut self, progressed: bool) -> Self {
        self.partial = self.partial || progressed;
        self
    }
}

impl From<RemoteError> for EffectFailure {
    #[inline]
    fn from(err: RemoteError) -> Self {
        Self {
            kind: err.kind,
            retryable: err.is_retryable(),
            reason: err.message,
            partial: false,
        }
    }
}

impl From<BulkRemoveError> for EffectFailure {
    #[inline]
    fn from(err: BulkRemoveError) -> Self {
        Self::from(err.error).after_progress(err.removed > 0)
    }
}

impl fmt::Display for EffectFailure {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.reason)
    }
}

/// Result of an Effect phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    /// The remote service accepted the change.
    Success,
    /// The remote call failed terminally.
    Failure(EffectFailure),
}

impl EffectOutcome {
    /// Returns `true` for [`EffectOutcome::Success`].
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(*self, Self::Success)
    }
}

impl From<Result<(), RemoteError>> for EffectOutcome {
    #[inline]
    fn from(result: Result<(), RemoteError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(err) => Self::Failure(err.into()),
        }
    }
}

impl From<Result<(), EffectFailure>> for EffectOutcome {
    #[inline]
    fn from(result: Result<(), EffectFailure>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(failure) => Self::Failure(failure),
        }
    }
}

/// Where a mutation instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationState {
    /// Validating and applying locally.
    PendingCommit,
    /// Applied locally.
    Committed,
    /// Waiting for the remote service.
    PendingEffect,
    /// Remote call succeeded (terminal).
    Succeeded,
    /// Reverting the local change.
    PendingRollback,
    /// Local change reverted (terminal).
    RolledBack,
}

impl MutationState {
    /// Returns `true` for terminal states.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::RolledBack)
    }
}

impl fmt::Display for MutationState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::PendingCommit => "pending commit",
            Self::Committed => "committed",
            Self::PendingEffect => "pending effect",
            Self::Succeeded => "succeeded",
            Self::PendingRollback => "pending rollback",
            Self::RolledBack => "rolled back",
        })
    }
}

/// How a committed mutation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The Effect succeeded.
    Succeeded,
    /// The Effect failed in a way that means the remote side already
    /// matches local state, so nothing was rolled back.
    Reconciled(EffectFailure),
    /// The Effect failed and the local change was reverted.
    RolledBack(EffectFailure),
}

/// Result of running a mutation through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport<T> {
    /// Value produced by the Commit.
    pub value: T,
    /// How the mutation ended.
    pub outcome: Outcome,
}

impl<T> MutationReport<T> {
    /// Returns `true` if the local change is still in place.
    #[inline]
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded | Outcome::Reconciled(_))
    }

    /// Returns the terminal lifecycle state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> MutationState {
        match self.outcome {
            Outcome::Succeeded | Outcome::Reconciled(_) => MutationState::Succeeded,
            Outcome::RolledBack(_) => MutationState::RolledBack,
        }
    }

    /// Returns the Effect failure, if there was one.
    #[inline]
    #[must_use]
    pub const fn failure(&self) -> Option<&EffectFailure> {
        match self.outcome {
            Outcome::Succeeded => None,
            Outcome::Reconciled(ref failure) | Outcome::RolledBack(ref failure) => Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_from_remote_error() {
        let failure = EffectFailure::from(RemoteError::from_status(503, "busy"));
        assert!(failure.retryable);
        assert!(!failure.partial);
        assert_eq!(failure.reason, "busy");
    }

    #[test]
    fn bulk_failure_after_progress_is_partial() {
        let failure = EffectFailure::from(BulkRemoveError {
            removed: 30,
            error: RemoteError::new(RemoteErrorKind::Timeout, "slow"),
        });
        assert!(failure.partial);
        let clean = EffectFailure::from(BulkRemoveError {
            removed: 0,
            error: RemoteError::new(RemoteErrorKind::Timeout, "slow"),
        });
        assert!(!clean.partial);
    }

    #[test]
    fn report_states() {
        let report = MutationReport {
            value: (),
            outcome: Outcome::RolledBack(
                RemoteError::new(RemoteErrorKind::Unavailable, "x").into(),
            ),
        };
        assert!(!report.is_applied());
        assert_eq!(report.state(), MutationState::RolledBack);
        assert!(report.state().is_terminal());
        assert!(!MutationState::PendingEffect.is_terminal());
    }
}
