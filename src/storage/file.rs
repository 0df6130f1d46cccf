//! JSON-file-based storage backend.
//!
//! Stores each resource in a separate JSON file under a configurable
//! directory (default: `$XDG_DATA_HOME/ledger-sync/`).

use alloc::collections::BTreeMap;
use core::future::{self, Future};
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{KeyValueCache, PersistedState, Storage};
use crate::error::{LedgerError, Result};
use crate::index::{DateIndex, TextIndex};
use crate::models::{
    Account, ImportProfile, ImportProfileMapping, ImportRule, ImportRuleAction,
    ImportRuleCondition, Preference, RecurringTransaction, Resource, Transaction,
};
use crate::store::{EntityStore, Stored};

/// Application name used for the XDG data directory.
const APP_NAME: &str = "ledger-sync";

/// Snapshot metadata; its presence marks a complete save.
const META_FILE: &str = "meta.json";
/// File name for the date index.
const DATE_INDEX_FILE: &str = "date_index.json";
/// File name for the text index.
const TEXT_INDEX_FILE: &str = "text_index.json";
/// File name for the key-value side channel.
const CACHE_FILE: &str = "cache.json";
/// Sentinel file used for cross-process file locking.
const LOCK_FILE: &str = "storage.lock";

/// Current on-disk layout version.
const FORMAT_VERSION: u32 = 1;

/// Metadata stored alongside the resource files.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    /// Layout version.
    version: u32,
    /// When the snapshot was written.
    saved_at: DateTime<Utc>,
}

/// File-backed storage that persists the ledger snapshot as JSON files.
///
/// Each resource is stored in a separate `<resource>.json` file holding an
/// `id → entity` object. `meta.json` is written last, so a snapshot
/// without it is treated as absent.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Cross-process safety is achieved via an advisory file lock
/// on `storage.lock` (using [`std::fs::File::lock`] /
/// [`std::fs::File::lock_shared`]).
///
/// Read operations acquire a shared lock (allowing concurrent readers),
/// while write operations acquire an exclusive lock.
///
/// # File layout
///
/// ```text
/// <dir>/
///   storage.lock                  (cross-process lock sentinel)
///   meta.json
///   accounts.json
///   transactions.json
///   recurring-transactions.json
///   import-rules.json
///   import-rule-actions.json
///   import-rule-conditions.json
///   import-profiles.json
///   import-profile-mappings.json
///   preferences.json
///   date_index.json
///   text_index.json
///   cache.json                    (key-value side channel)
/// ```
#[derive(Debug)]
pub struct FileStorage {
    /// Root directory containing all JSON files.
    dir: PathBuf,
    /// Mutex serializing concurrent in-process access.
    lock: Mutex<()>,
    /// Sentinel file for cross-process advisory locking.
    lock_file: fs::File,
}

impl FileStorage {
    /// Creates a new file storage rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist. Also
    /// opens (or creates) the `storage.lock` sentinel file used for
    /// cross-process advisory locking.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the lock
    /// file cannot be opened.
    #[inline]
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(storage_io_error)?;
        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(storage_io_error)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
            lock_file,
        })
    }

    /// Returns the default XDG-compliant data directory for this application.
    ///
    /// On Linux: `$XDG_DATA_HOME/ledger-sync/` (typically
    /// `~/.local/share/ledger-sync/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform data directory cannot be determined.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|data_path| data_path.join(APP_NAME))
            .ok_or_else(|| {
                LedgerError::Storage("could not determine platform data directory".into())
            })
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Returns the full path for a given file name.
    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Acquires an in-process mutex guard and a shared (read) file lock,
    /// executes `op`, then releases the file lock.
    fn with_shared_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock_shared().map_err(storage_io_error)?;
        let result = op();
        // Only surface the unlock error when the operation succeeded;
        // otherwise the original error is more useful.
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Acquires an in-process mutex guard and an exclusive (write) file
    /// lock, executes `op`, then releases the file lock.
    fn with_exclusive_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Reads and deserializes a JSON file. Returns `None` if the file
    /// does not exist.
    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(LedgerError::from),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_io_error(err)),
        }
    }

    /// Atomically writes a serialized JSON file (write-to-tmp then rename).
    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.path(name);
        let tmp_path = self.path(&format!("{name}.tmp"));
        let json = serde_json::to_string_pretty(value).map_err(LedgerError::from)?;
        fs::write(&tmp_path, json).map_err(storage_io_error)?;
        fs::rename(&tmp_path, &path).map_err(storage_io_error)?;
        Ok(())
    }

    /// Deletes a file, ignoring one that is already gone.
    fn remove_json(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_io_error(err)),
        }
    }

    /// Loads one resource file into the store.
    fn read_collection<E: Stored>(&self, store: &mut EntityStore) -> Result<()> {
        if let Some(collection) = self.read_json(&resource_file(E::RESOURCE))? {
            *E::collection_mut(store) = collection;
        }
        Ok(())
    }

    /// Writes one resource file from the store.
    fn write_collection<E: Stored>(&self, store: &EntityStore) -> Result<()> {
        self.write_json(&resource_file(E::RESOURCE), E::collection(store))
    }

    /// Reads the full snapshot (caller holds the lock).
    fn read_snapshot(&self) -> Result<Option<PersistedState>> {
        let Some(meta) = self.read_json::<Meta>(META_FILE)? else {
            return Ok(None);
        };
        if meta.version != FORMAT_VERSION {
            return Err(LedgerError::Storage(
                format!("unsupported storage version {}", meta.version).into(),
            ));
        }
        let mut store = EntityStore::default();
        self.read_collection::<Account>(&mut store)?;
        self.read_collection::<Transaction>(&mut store)?;
        self.read_collection::<RecurringTransaction>(&mut store)?;
        self.read_collection::<ImportRule>(&mut store)?;
        self.read_collection::<ImportRuleAction>(&mut store)?;
        self.read_collection::<ImportRuleCondition>(&mut store)?;
        self.read_collection::<ImportProfile>(&mut store)?;
        self.read_collection::<ImportProfileMapping>(&mut store)?;
        self.read_collection::<Preference>(&mut store)?;
        tracing::debug!(saved_at = %meta.saved_at, "loaded snapshot");
        Ok(Some(PersistedState {
            store,
            date_index: self.read_json::<DateIndex>(DATE_INDEX_FILE)?,
            text_index: self.read_json::<TextIndex>(TEXT_INDEX_FILE)?,
        }))
    }

    /// Writes the full snapshot, metadata last (caller holds the lock).
    fn write_snapshot(&self, state: &PersistedState) -> Result<()> {
        // Invalidate first so a crash mid-save leaves no half snapshot.
        self.remove_json(META_FILE)?;
        let store = &state.store;
        self.write_collection::<Account>(store)?;
        self.write_collection::<Transaction>(store)?;
        self.write_collection::<RecurringTransaction>(store)?;
        self.write_collection::<ImportRule>(store)?;
        self.write_collection::<ImportRuleAction>(store)?;
        self.write_collection::<ImportRuleCondition>(store)?;
        self.write_collection::<ImportProfile>(store)?;
        self.write_collection::<ImportProfileMapping>(store)?;
        self.write_collection::<Preference>(store)?;
        match state.date_index {
            Some(ref index) => self.write_json(DATE_INDEX_FILE, index)?,
            None => self.remove_json(DATE_INDEX_FILE)?,
        }
        match state.text_index {
            Some(ref index) => self.write_json(TEXT_INDEX_FILE, index)?,
            None => self.remove_json(TEXT_INDEX_FILE)?,
        }
        self.write_json(
            META_FILE,
            &Meta {
                version: FORMAT_VERSION,
                saved_at: Utc::now(),
            },
        )
    }

    /// Deletes the snapshot files.
    ///
    /// The `storage.lock` sentinel and the cache are preserved.
    fn clear_all(&self) -> Result<()> {
        self.with_exclusive_lock(|| {
            self.remove_json(META_FILE)?;
            for resource in Resource::ALL {
                self.remove_json(&resource_file(resource))?;
            }
            self.remove_json(DATE_INDEX_FILE)?;
            self.remove_json(TEXT_INDEX_FILE)
        })
    }

    /// Reads the cache map (caller holds the lock).
    fn read_cache(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.read_json(CACHE_FILE)?.unwrap_or_default())
    }
}

// ── Free-standing helpers ───────────────────────────────────────────────

/// Returns the file name holding a resource.
fn resource_file(resource: Resource) -> String {
    format!("{}.json", resource.path())
}

/// Wraps an I/O error into a [`LedgerError::Storage`].
fn storage_io_error(err: std::io::Error) -> LedgerError {
    LedgerError::Storage(Box::new(err))
}

/// Wraps a mutex poison error into a [`LedgerError::Storage`].
fn lock_poison_error<T>(err: &std::sync::PoisonError<T>) -> LedgerError {
    LedgerError::Storage(err.to_string().into())
}

impl Storage for FileStorage {
    #[inline]
    fn load(&self) -> impl Future<Output = Result<Option<PersistedState>>> + Send {
        future::ready(self.with_shared_lock(|| self.read_snapshot()))
    }

    #[tracing::instrument(skip_all, fields(transactions = state.store.transactions.len()))]
    fn save(&self, state: &PersistedState) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.with_exclusive_lock(|| self.write_snapshot(state)))
    }

    #[inline]
    fn clear(&self) -> impl Future<Output = Result<()>> + Send {
        future::ready(self.clear_all())
    }
}

impl KeyValueCache for FileStorage {
    #[inline]
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_shared_lock(|| Ok(self.read_cache()?.remove(key)))
    }

    #[inline]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_exclusive_lock(|| {
            let mut cache = self.read_cache()?;
            let _old = cache.insert(key.to_owned(), value.to_owned());
            self.write_json(CACHE_FILE, &cache)
        })
    }

    #[inline]
    fn remove(&self, key: &str) -> Result<()> {
        self.with_exclusive_lock(|| {
            let mut cache = self.read_cache()?;
            if cache.remove(key).is_none() {
                return Ok(());
            }
            self.write_json(CACHE_FILE, &cache)
        })
    }
}
