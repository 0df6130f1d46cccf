//! In-memory storage backend for testing.
//!
//! Provides [`InMemoryStorage`], a thread-safe in-memory implementation of
//! [`Storage`] and [`KeyValueCache`]. Ideal for unit and integration tests
//! where file I/O is undesirable.

use alloc::collections::BTreeMap;
use core::future::{self, Future};
use std::sync::Mutex;

use super::{KeyValueCache, PersistedState, Storage};
use crate::error::{LedgerError, Result};

/// Thread-safe in-memory storage for testing.
///
/// # Example
///
/// ```rust
/// use ledger_sync::storage::InMemoryStorage;
///
/// let storage = InMemoryStorage::new();
/// // Hand it to `Ledger::save_to` / `Ledger::load_from`.
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// All state behind a single mutex for thread-safe interior mutability.
    inner: Mutex<Inner>,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Last saved snapshot.
    snapshot: Option<PersistedState>,
    /// Side-channel values.
    cache: BTreeMap<String, String>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F: FnOnce(&mut Inner) -> R>(&self, f: F) -> Result<R> {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(f(&mut inner))
    }
}

/// Wraps a mutex poison error.
fn lock_error<T>(err: &std::sync::PoisonError<T>) -> LedgerError {
    LedgerError::Storage(err.to_string().into())
}

impl Storage for InMemoryStorage {
    #[inline]
    fn load(&self) -> impl Future<Output = Result<Option<PersistedState>>> + Send {
        future::ready(self.with_lock(|inner| inner.snapshot.clone()))
    }

    #[inline]
    fn save(&self, state: &PersistedState) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.with_lock(|inner| inner.snapshot = Some(state.clone())))
    }

    #[inline]
    fn clear(&self) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.with_lock(|inner| inner.snapshot = None))
    }
}

impl KeyValueCache for InMemoryStorage {
    #[inline]
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_lock(|inner| inner.cache.get(key).cloned())
    }

    #[inline]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_lock(|inner| {
            let _old = inner.cache.insert(key.to_owned(), value.to_owned());
        })
    }

    #[inline]
    fn remove(&self, key: &str) -> Result<()> {
        self.with_lock(|inner| {
            let _old = inner.cache.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::sample_state;

    #[tokio::test]
    async fn empty_storage_loads_nothing() {
        let storage = InMemoryStorage::new();
        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_load_clear() {
        let storage = InMemoryStorage::new();
        let persisted = PersistedState::capture(&sample_state());
        storage.save(&persisted).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), Some(persisted));
        storage.clear().await.unwrap();
        assert!(storage.load().await.unwrap().is_none());
    }

    #[test]
    fn cache_get_set_remove() {
        let storage = InMemoryStorage::new();
        assert!(storage.get("last-account").unwrap().is_none());
        storage.set("last-account", "bank").unwrap();
        assert_eq!(storage.get("last-account").unwrap().as_deref(), Some("bank"));
        storage.remove("last-account").unwrap();
        storage.remove("last-account").unwrap();
        assert!(storage.get("last-account").unwrap().is_none());
    }
}
