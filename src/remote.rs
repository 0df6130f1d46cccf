//! The remote RPC boundary.
//!
//! [`Transport`] is the untyped per-resource service contract
//! (`find`, `create`, `update`, `remove` and their batched forms) over
//! JSON values. [`Remote`] layers typed entities and field encryption on
//! top of any transport.

#[cfg(feature = "http")]
mod http;
mod memory;

use alloc::sync::Arc;
use core::future::Future;

use serde_json::Value;

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportBuilder};
pub use memory::{Call, InMemoryTransport, Operation};

use crate::encryption::{self, Cipher};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::models::{Entity, Resource};

/// Maximum number of ids sent in one bulk removal.
pub const REMOVE_CHUNK_SIZE: usize = 30;

/// Per-resource remote service operations.
///
/// Payloads are plain JSON; encryption happens above this layer.
pub trait Transport: Send + Sync + core::fmt::Debug {
    /// Fetches every record of a resource.
    fn find(
        &self,
        resource: Resource,
    ) -> impl Future<Output = Result<Vec<Value>, RemoteError>> + Send;

    /// Creates one record.
    fn create(
        &self,
        resource: Resource,
        payload: Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Creates a batch of records in one call.
    fn create_many(
        &self,
        resource: Resource,
        payloads: Vec<Value>,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Replaces the record stored under `id`.
    fn update(
        &self,
        resource: Resource,
        id: String,
        payload: Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Removes one record.
    fn remove(
        &self,
        resource: Resource,
        id: String,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Removes every record whose id is in `ids`.
    fn remove_many(
        &self,
        resource: Resource,
        ids: Vec<String>,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// A chunked bulk removal that stopped part way through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("removal stopped after {removed} records: {error}")]
pub struct BulkRemoveError {
    /// Records confirmed removed before the failure.
    pub removed: usize,
    /// The failure that stopped the removal.
    pub error: RemoteError,
}

/// Typed, encrypting facade over a [`Transport`].
#[derive(Debug)]
pub struct Remote<T> {
    /// Underlying service.
    transport: T,
    /// Field cipher; payloads travel in plaintext when absent.
    cipher: Option<Arc<dyn Cipher>>,
}

impl<T: Transport> Remote<T> {
    /// Wraps a transport without encryption.
    #[inline]
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            cipher: None,
        }
    }

    /// Wraps a transport, encrypting declared fields with `cipher`.
    #[inline]
    #[must_use]
    pub fn encrypted(transport: T, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            transport,
            cipher: Some(cipher),
        }
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the field cipher, if any.
    #[inline]
    #[must_use]
    pub fn cipher(&self) -> Option<&Arc<dyn Cipher>> {
        self.cipher.as_ref()
    }

    /// Serializes and encrypts an entity.
    fn encode<E: Entity>(&self, item: &E) -> Result<Value, RemoteError> {
        let mut payload = serde_json::to_value(item)
            .map_err(|err| RemoteError::new(RemoteErrorKind::Decode, err.to_string()))?;
        if let Some(ref cipher) = self.cipher {
            let schema = encryption::schema(E::RESOURCE);
            encryption::encrypt_fields(cipher.as_ref(), schema, &mut payload)
                .map_err(|err| RemoteError::new(RemoteErrorKind::Decode, err.to_string()))?;
        }
        Ok(payload)
    }

    /// Decrypts and deserializes an entity.
    fn decode<E: Entity>(&self, mut payload: Value) -> Result<E, RemoteError> {
        if let Some(ref cipher) = self.cipher {
            let schema = encryption::schema(E::RESOURCE);
            encryption::decrypt_fields(cipher.as_ref(), schema, &mut payload)
                .map_err(|err| RemoteError::new(RemoteErrorKind::Decode, err.to_string()))?;
        }
        serde_json::from_value(payload)
            .map_err(|err| RemoteError::new(RemoteErrorKind::Decode, err.to_string()))
    }

    /// Fetches and decrypts every record of `E`'s resource.
    ///
    /// # Errors
    ///
    /// Returns the transport error, or [`RemoteErrorKind::Decode`] if any
    /// record fails to decrypt or deserialize.
    #[tracing::instrument(skip_all, fields(resource = %E::RESOURCE))]
    pub async fn find<E: Entity>(&self) -> Result<Vec<E>, RemoteError> {
        let payloads = self.transport.find(E::RESOURCE).await?;
        tracing::debug!(count = payloads.len(), "fetched records");
        payloads
            .into_iter()
            .map(|payload| self.decode(payload))
            .collect()
    }

    /// Creates one entity remotely.
    ///
    /// # Errors
    ///
    /// Returns the transport or encoding error.
    #[inline]
    pub async fn create<E: Entity>(&self, item: &E) -> Result<(), RemoteError> {
        let payload = self.encode(item)?;
        self.transport.create(E::RESOURCE, payload).await
    }

    /// Creates a batch of entities in one remote call.
    ///
    /// An empty batch is not sent.
    ///
    /// # Errors
    ///
    /// Returns the transport or encoding error.
    pub async fn create_many<E: Entity>(&self, items: &[E]) -> Result<(), RemoteError> {
        if items.is_empty() {
            return Ok(());
        }
        let payloads = items
            .iter()
            .map(|item| self.encode(item))
            .collect::<Result<Vec<_>, _>>()?;
        self.transport.create_many(E::RESOURCE, payloads).await
    }

    /// Replaces an entity remotely.
    ///
    /// # Errors
    ///
    /// Returns the transport or encoding error.
    #[inline]
    pub async fn update<E: Entity>(&self, item: &E) -> Result<(), RemoteError> {
        let payload = self.encode(item)?;
        self.transport
            .update(E::RESOURCE, item.id().to_string(), payload)
            .await
    }

    /// Removes an entity remotely.
    ///
    /// # Errors
    ///
    /// Returns the transport error.
    #[inline]
    pub async fn remove<E: Entity>(&self, id: &E::Id) -> Result<(), RemoteError> {
        self.transport.remove(E::RESOURCE, id.to_string()).await
    }

    /// Removes entities in chunks of [`REMOVE_CHUNK_SIZE`].
    ///
    /// # Errors
    ///
    /// Stops at the first failed chunk and reports how many records were
    /// removed before it.
    #[tracing::instrument(skip_all, fields(resource = %E::RESOURCE, count = ids.len()))]
    pub async fn remove_many<E: Entity>(&self, ids: &[E::Id]) -> Result<(), BulkRemoveError> {
        let mut removed = 0;
        for chunk in ids.chunks(REMOVE_CHUNK_SIZE) {
            let batch: Vec<String> = chunk.iter().map(ToString::to_string).collect();
            if let Err(error) = self.transport.remove_many(E::RESOURCE, batch).await {
                return Err(BulkRemoveError { removed, error });
            }
            removed += chunk.len();
            tracing::trace!(removed, "removed chunk");
        }
        Ok(())
    }
}
