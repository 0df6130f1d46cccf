//! Pluggable storage backends for persisting local ledger state.
//!
//! A [`Storage`] keeps one snapshot of the entity store together with the
//! date and text indexes, so a restart can skip the full fetch. Virtual
//! transactions and the membership index are never persisted; they are
//! re-derived on load. A [`KeyValueCache`] is a separate side channel for
//! small values such as the last used account.

#[cfg(feature = "storage-file")]
mod file;
mod memory;

use core::future::Future;

#[cfg(feature = "storage-file")]
pub use file::FileStorage;
pub use memory::InMemoryStorage;

use crate::error::Result;
use crate::index::{DateIndex, DerivedIndexes, TextIndex};
use crate::state::LedgerState;
use crate::store::EntityStore;

/// Everything a [`Storage`] persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    /// Per-resource normalized maps.
    pub store: EntityStore,
    /// Date index as last saved, if any.
    pub date_index: Option<DateIndex>,
    /// Text index as last saved, if any.
    pub text_index: Option<TextIndex>,
}

impl PersistedState {
    /// Captures the persistable parts of a ledger state.
    #[must_use]
    pub fn capture(state: &LedgerState) -> Self {
        Self {
            store: state.store.clone(),
            date_index: Some(state.indexes.date.clone()),
            text_index: Some(state.indexes.text.clone()),
        }
    }

    /// Rebuilds a ledger state from the persisted store.
    ///
    /// Indexes are always re-derived from the store. Persisted indexes
    /// that disagree with the rebuild are logged and discarded.
    #[must_use]
    pub fn into_state(self) -> LedgerState {
        let indexes = DerivedIndexes::build(&self.store);
        if self
            .date_index
            .is_some_and(|saved| saved != indexes.date)
        {
            tracing::warn!("persisted date index is stale, using rebuilt index");
        }
        if self
            .text_index
            .is_some_and(|saved| saved != indexes.text)
        {
            tracing::warn!("persisted text index is stale, using rebuilt index");
        }
        LedgerState {
            store: self.store,
            indexes,
            ..LedgerState::default()
        }
    }
}

/// Async storage for the persisted ledger snapshot.
pub trait Storage: core::fmt::Debug + Send + Sync {
    /// Returns the last saved snapshot.
    ///
    /// Returns `Ok(None)` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to read.
    fn load(&self) -> impl Future<Output = Result<Option<PersistedState>>> + Send;

    /// Replaces the saved snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to write.
    fn save(&self, state: &PersistedState) -> impl Future<Output = Result<()>> + Send;

    /// Deletes the saved snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to delete.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Small string values kept next to the snapshot.
pub trait KeyValueCache: core::fmt::Debug + Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`; absent keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn remove(&self, key: &str) -> Result<()>;
}
