//! Offline queueing and retry around a [`Transport`].
//!
//! [`OfflineQueue`] is itself a transport. Writes are serialized through
//! a fair lock so they reach the service in the order they were issued;
//! while the queue is marked offline they wait for connectivity instead
//! of failing. Every attempt is bounded by a timeout, and retryable
//! failures are retried with exponential backoff up to the policy's
//! attempt limit. Reads never wait: offline, they fail immediately.

use core::future::Future;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, watch};

use crate::error::{RemoteError, RemoteErrorKind};
use crate::models::Resource;
use crate::remote::Transport;

/// Retry and timeout limits for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each later one.
    pub base_delay: Duration,
    /// Upper bound on a single attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay after the given failed attempt (1-based).
    #[inline]
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Decrements the pending counter when a queued call finishes or is
/// dropped.
#[derive(Debug)]
struct PendingGuard<'queue>(&'queue AtomicUsize);

impl Drop for PendingGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        let _previous = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Queues writes while offline and retries transient failures.
#[derive(Debug)]
pub struct OfflineQueue<T> {
    /// Wrapped service.
    transport: T,
    /// Retry limits.
    policy: RetryPolicy,
    /// Connectivity flag; receivers wait on it.
    online: watch::Sender<bool>,
    /// Serializes writes in arrival order.
    order: Mutex<()>,
    /// Writes issued but not yet resolved.
    pending: AtomicUsize,
}

impl<T: Transport> OfflineQueue<T> {
    /// Wraps a transport; the queue starts online.
    #[inline]
    #[must_use]
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        let (online, _receiver) = watch::channel(true);
        Self {
            transport,
            policy,
            online,
            order: Mutex::new(()),
            pending: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped transport.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the retry policy.
    #[inline]
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Marks connectivity as available or lost.
    ///
    /// Going online releases queued writes in order.
    #[inline]
    pub fn set_online(&self, online: bool) {
        tracing::info!(online, "connectivity changed");
        let _changed = self.online.send_replace(online);
    }

    /// Returns the current connectivity flag.
    #[inline]
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Returns the number of writes waiting or in flight.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until connectivity is available.
    async fn wait_online(&self) {
        let mut receiver = self.online.subscribe();
        let ready = receiver.wait_for(|online| *online).await.map(|_online| ());
        if ready.is_err() {
            tracing::warn!("connectivity channel closed");
        }
    }

    /// Runs `call` with a timeout per attempt and retries transient
    /// failures.
    async fn attempt<F, Fut, R>(&self, call: F, wait: bool) -> Result<R, RemoteError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<R, RemoteError>> + Send,
        R: Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if wait {
                self.wait_online().await;
            } else if !self.is_online() {
                return Err(RemoteError::new(RemoteErrorKind::Unavailable, "offline"));
            }
            let result = tokio::time::timeout(self.policy.call_timeout, call())
                .await
                .unwrap_or_else(|_elapsed| {
                    Err(RemoteError::new(
                        RemoteErrorKind::Timeout,
                        format!("no response within {} ms", self.policy.call_timeout.as_millis()),
                    ))
                });
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    tracing::debug!(attempt, ?delay, error = %err, "retrying remote call");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "remote call failed");
                    return Err(err);
                }
            }
        }
    }

    /// Runs a write in arrival order, waiting for connectivity.
    async fn write<F, Fut>(&self, call: F) -> Result<(), RemoteError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<(), RemoteError>> + Send,
    {
        let _previous = self.pending.fetch_add(1, Ordering::SeqCst);
        let _pending = PendingGuard(&self.pending);
        let _turn = self.order.lock().await;
        self.attempt(call, true).await
    }
}

impl<T: Transport> Transport for OfflineQueue<T> {
    async fn find(&self, resource: Resource) -> Result<Vec<Value>, RemoteError> {
        self.attempt(|| self.transport.find(resource), false).await
    }

    async fn create(&self, resource: Resource, payload: Value) -> Result<(), RemoteError> {
        self.write(|| self.transport.create(resource, payload.clone()))
            .await
    }

    async fn create_many(
        &self,
        resource: Resource,
        payloads: Vec<Value>,
    ) -> Result<(), RemoteError> {
        self.write(|| self.transport.create_many(resource, payloads.clone()))
            .await
    }

    async fn update(
        &self,
        resource: Resource,
        id: String,
        payload: Value,
    ) -> Result<(), RemoteError> {
        self.write(|| self.transport.update(resource, id.clone(), payload.clone()))
            .await
    }

    async fn remove(&self, resource: Resource, id: String) -> Result<(), RemoteError> {
        self.write(|| self.transport.remove(resource, id.clone()))
            .await
    }

    async fn remove_many(&self, resource: Resource, ids: Vec<String>) -> Result<(), RemoteError> {
        self.write(|| self.transport.remove_many(resource, ids.clone()))
            .await
    }
}
