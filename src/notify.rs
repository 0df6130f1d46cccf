//! User-facing notifications.
//!
//! The pipeline reports every rolled-back Effect through a [`Notifier`];
//! the undo controller reports restores the same way. Rendering is up to
//! the embedding application.

use alloc::sync::Arc;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Confirmation of a completed action.
    Success,
    /// Something completed with caveats.
    Warning,
    /// An action failed and local changes were reverted.
    Error,
}

/// A transient, dismissible message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub level: Level,
    /// Human readable text.
    pub message: String,
}

impl Notification {
    /// Builds a success notification.
    #[inline]
    #[must_use]
    pub fn success<M: Into<String>>(message: M) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    /// Builds a warning notification.
    #[inline]
    #[must_use]
    pub fn warning<M: Into<String>>(message: M) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
        }
    }

    /// Builds an error notification.
    #[inline]
    #[must_use]
    pub fn error<M: Into<String>>(message: M) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync + core::fmt::Debug {
    /// Shows a notification.
    fn notify(&self, notification: Notification);
}

/// Discards every notification after logging it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    #[inline]
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Success => tracing::info!(message = %notification.message, "notification"),
            Level::Warning => tracing::warn!(message = %notification.message, "notification"),
            Level::Error => tracing::error!(message = %notification.message, "notification"),
        }
    }
}

/// Keeps every notification in memory; used by tests and by callers that
/// poll for messages.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    /// Notifications in arrival order.
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Returns every notification shown so far.
    #[inline]
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns every notification shown so far.
    #[inline]
    #[must_use]
    pub fn take(&self) -> Vec<Notification> {
        core::mem::take(&mut *self.seen.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for RecordingNotifier {
    #[inline]
    fn notify(&self, notification: Notification) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

/// Forwards notifications over an unbounded channel to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    /// Sending half; the UI owns the receiver.
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiver the UI should drain.
    #[inline]
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    #[inline]
    fn notify(&self, notification: Notification) {
        if let Err(err) = self.sender.send(notification) {
            tracing::debug!(message = %err.0.message, "notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order() {
        let notifier = RecordingNotifier::default();
        notifier.notify(Notification::error("first"));
        notifier.notify(Notification::success("second"));
        let seen = notifier.take();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].level, Level::Error);
        assert_eq!(seen[1].message, "second");
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn channel_forwards_to_receiver() {
        let (notifier, mut receiver) = ChannelNotifier::new();
        notifier.notify(Notification::warning("careful"));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received, Notification::warning("careful"));
        drop(receiver);
        notifier.notify(Notification::error("nobody listens"));
    }
}
