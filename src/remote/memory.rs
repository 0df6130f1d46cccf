//! In-memory remote service for testing.
//!
//! Provides [`InMemoryTransport`], a thread-safe stand-in for the backend
//! that keeps records as JSON, enforces id uniqueness the way the real
//! service does, records every call, and can be told to fail or to go
//! offline.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use super::Transport;
use crate::error::{RemoteError, RemoteErrorKind};
use crate::models::Resource;

/// Transport operation, used to target failures and in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`Transport::find`].
    Find,
    /// [`Transport::create`].
    Create,
    /// [`Transport::create_many`].
    CreateMany,
    /// [`Transport::update`].
    Update,
    /// [`Transport::remove`].
    Remove,
    /// [`Transport::remove_many`].
    RemoveMany,
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Target resource.
    pub resource: Resource,
    /// Operation invoked.
    pub operation: Operation,
    /// Record ids the call carried.
    pub ids: Vec<String>,
}

/// A scheduled failure.
#[derive(Debug)]
struct Failure {
    /// Resource the failure applies to.
    resource: Resource,
    /// Operation the failure applies to.
    operation: Operation,
    /// Matching calls to let through first.
    skip: usize,
    /// Matching calls still to fail.
    remaining: usize,
    /// Error kind to return.
    kind: RemoteErrorKind,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Stored records by resource, then id.
    records: BTreeMap<Resource, BTreeMap<String, Value>>,
    /// Pending scheduled failures.
    failures: Vec<Failure>,
    /// When set, every call fails as unavailable.
    offline: bool,
    /// Every call, successful or not, in arrival order.
    calls: Vec<Call>,
}

impl Inner {
    /// Logs a call and returns the error it should fail with, if any.
    fn admit(
        &mut self,
        resource: Resource,
        operation: Operation,
        ids: Vec<String>,
    ) -> Result<(), RemoteError> {
        self.calls.push(Call {
            resource,
            operation,
            ids,
        });
        if self.offline {
            return Err(RemoteError::new(RemoteErrorKind::Unavailable, "offline"));
        }
        let Some(position) = self
            .failures
            .iter()
            .position(|failure| failure.resource == resource && failure.operation == operation)
        else {
            return Ok(());
        };
        let Some(failure) = self.failures.get_mut(position) else {
            return Ok(());
        };
        if failure.skip > 0 {
            failure.skip -= 1;
            return Ok(());
        }
        failure.remaining -= 1;
        let kind = failure.kind;
        if failure.remaining == 0 {
            let _done = self.failures.remove(position);
        }
        Err(RemoteError::new(kind, "injected failure"))
    }

    /// Returns the record map of a resource.
    fn table(&mut self, resource: Resource) -> &mut BTreeMap<String, Value> {
        self.records.entry(resource).or_default()
    }
}

/// Extracts the `id` field of a payload.
fn payload_id(payload: &Value) -> Result<String, RemoteError> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            RemoteError::new(RemoteErrorKind::Rejected { status: 400 }, "id is required")
        })
}

/// Error returned for a duplicate id, shaped like the backend's.
fn unique_violation() -> RemoteError {
    RemoteError::new(RemoteErrorKind::AlreadyExists, "id must be unique")
}

/// Thread-safe in-memory backend.
///
/// Clones share the same records, so a test can keep one handle for
/// assertions while the ledger owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    /// All state behind a single mutex.
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTransport {
    /// Creates an empty backend.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F: FnOnce(&mut Inner) -> R>(&self, f: F) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Stores records directly, bypassing the call log.
    ///
    /// Records without a string `id` are ignored.
    pub fn seed<I: IntoIterator<Item = Value>>(&self, resource: Resource, records: I) {
        self.with_lock(|inner| {
            for record in records {
                if let Ok(id) = payload_id(&record) {
                    let _old = inner.table(resource).insert(id, record);
                }
            }
        });
    }

    /// Returns the stored records of a resource, ordered by id.
    #[inline]
    #[must_use]
    pub fn records(&self, resource: Resource) -> Vec<Value> {
        self.with_lock(|inner| inner.table(resource).values().cloned().collect())
    }

    /// Returns `true` if a record with `id` is stored.
    #[inline]
    #[must_use]
    pub fn contains(&self, resource: Resource, id: &str) -> bool {
        self.with_lock(|inner| inner.table(resource).contains_key(id))
    }

    /// Returns every call received so far.
    #[inline]
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.with_lock(|inner| inner.calls.clone())
    }

    /// Makes the next matching call fail with `kind`.
    #[inline]
    pub fn fail_next(&self, resource: Resource, operation: Operation, kind: RemoteErrorKind) {
        self.fail_times(resource, operation, 1, kind);
    }

    /// Makes the next `times` matching calls fail with `kind`.
    pub fn fail_times(
        &self,
        resource: Resource,
        operation: Operation,
        times: usize,
        kind: RemoteErrorKind,
    ) {
        if times == 0 {
            return;
        }
        self.with_lock(|inner| {
            inner.failures.push(Failure {
                resource,
                operation,
                skip: 0,
                remaining: times,
                kind,
            });
        });
    }

    /// Lets `skip` matching calls through, then fails the next one.
    pub fn fail_after(
        &self,
        resource: Resource,
        operation: Operation,
        skip: usize,
        kind: RemoteErrorKind,
    ) {
        self.with_lock(|inner| {
            inner.failures.push(Failure {
                resource,
                operation,
                skip,
                remaining: 1,
                kind,
            });
        });
    }

    /// Switches connectivity off or back on.
    #[inline]
    pub fn set_offline(&self, offline: bool) {
        self.with_lock(|inner| inner.offline = offline);
    }
}

impl Transport for InMemoryTransport {
    async fn find(&self, resource: Resource) -> Result<Vec<Value>, RemoteError> {
        self.with_lock(|inner| {
            inner.admit(resource, Operation::Find, Vec::new())?;
            Ok(inner.table(resource).values().cloned().collect())
        })
    }

    async fn create(&self, resource: Resource, payload: Value) -> Result<(), RemoteError> {
        let id = payload_id(&payload)?;
        self.with_lock(|inner| {
            inner.admit(resource, Operation::Create, vec![id.clone()])?;
            let table = inner.table(resource);
            if table.contains_key(&id) {
                return Err(unique_violation());
            }
            let _old = table.insert(id, payload);
            Ok(())
        })
    }

    async fn create_many(
        &self,
        resource: Resource,
        payloads: Vec<Value>,
    ) -> Result<(), RemoteError> {
        let ids = payloads
            .iter()
            .map(payload_id)
            .collect::<Result<Vec<_>, _>>()?;
        self.with_lock(|inner| {
            inner.admit(resource, Operation::CreateMany, ids.clone())?;
            let table = inner.table(resource);
            if ids.iter().any(|id| table.contains_key(id)) {
                return Err(unique_violation());
            }
            table.extend(ids.into_iter().zip(payloads));
            Ok(())
        })
    }

    async fn update(
        &self,
        resource: Resource,
        id: String,
        payload: Value,
    ) -> Result<(), RemoteError> {
        self.with_lock(|inner| {
            inner.admit(resource, Operation::Update, vec![id.clone()])?;
            match inner.table(resource).get_mut(&id) {
                Some(record) => {
                    *record = payload;
                    Ok(())
                }
                None => Err(RemoteError::new(RemoteErrorKind::NotFound, format!("no record {id}"))),
            }
        })
    }

    async fn remove(&self, resource: Resource, id: String) -> Result<(), RemoteError> {
        self.with_lock(|inner| {
            inner.admit(resource, Operation::Remove, vec![id.clone()])?;
            match inner.table(resource).remove(&id) {
                Some(_) => Ok(()),
                None => Err(RemoteError::new(RemoteErrorKind::NotFound, format!("no record {id}"))),
            }
        })
    }

    async fn remove_many(&self, resource: Resource, ids: Vec<String>) -> Result<(), RemoteError> {
        self.with_lock(|inner| {
            inner.admit(resource, Operation::RemoveMany, ids.clone())?;
            let table = inner.table(resource);
            for id in &ids {
                let _old = table.remove(id);
            }
            Ok(())
        })
    }
}
