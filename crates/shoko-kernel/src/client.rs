//! Server-side representatives of remote observers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

/// Why a push did not reach its observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The observer is gone for good.
    #[error("observer disconnected")]
    Disconnected,

    /// The observer is not draining its queue; this push was dropped.
    #[error("observer queue full")]
    Backpressure,
}

/// A channel that can carry cache invalidations to one observer.
///
/// `push` must not block the caller: it is invoked from store operations
/// while locks are held.
pub trait InvalidationSink: Send + Sync {
    fn push(&self, name: &str) -> Result<(), NotifyError>;
}

impl InvalidationSink for mpsc::Sender<String> {
    fn push(&self, name: &str) -> Result<(), NotifyError> {
        self.try_send(name.to_owned()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Disconnected,
        })
    }
}

impl InvalidationSink for mpsc::UnboundedSender<String> {
    fn push(&self, name: &str) -> Result<(), NotifyError> {
        self.send(name.to_owned())
            .map_err(|_| NotifyError::Disconnected)
    }
}

/// One registered observer.
///
/// Equality and hashing use the identity only: two handles with the same
/// identity are the same client, whatever channel they hold.
pub struct ClientHandle {
    identity: String,
    channel: Box<dyn InvalidationSink>,
    active: AtomicBool,
}

impl ClientHandle {
    pub fn new(identity: impl Into<String>, channel: impl InvalidationSink + 'static) -> Self {
        Self {
            identity: identity.into(),
            channel: Box::new(channel),
            active: AtomicBool::new(true),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark this handle unreachable. It stays registered.
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::debug!(identity = %self.identity, "client deactivated");
        }
    }

    /// Push an invalidation for `name`.
    ///
    /// Failures are logged here and never propagate. A disconnected channel
    /// deactivates the handle. Returns whether the push was accepted.
    pub fn notify(&self, name: &str) -> bool {
        match self.channel.push(name) {
            Ok(()) => {
                tracing::trace!(identity = %self.identity, name, "invalidation sent");
                true
            }
            Err(NotifyError::Disconnected) => {
                tracing::warn!(identity = %self.identity, name, "invalidation undeliverable: client disconnected");
                self.deactivate();
                false
            }
            Err(e) => {
                tracing::warn!(identity = %self.identity, name, error = %e, "invalidation dropped");
                false
            }
        }
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for ClientHandle {}

impl Hash for ClientHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("identity", &self.identity)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    impl InvalidationSink for Unreachable {
        fn push(&self, _name: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Backpressure)
        }
    }

    #[test]
    fn test_equality_is_by_identity() {
        let (tx_a, _rx_a) = mpsc::unbounded_channel::<String>();
        let (tx_b, _rx_b) = mpsc::unbounded_channel::<String>();
        let a = ClientHandle::new("alice", tx_a);
        let b = ClientHandle::new("alice", tx_b);
        let c = ClientHandle::new("bob", Unreachable);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_notify_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ClientHandle::new("alice", tx);
        assert!(handle.is_active());
        assert!(handle.notify("a.txt"));
        assert_eq!(rx.try_recv().unwrap(), "a.txt");
    }

    #[test]
    fn test_notify_failure_is_contained() {
        let handle = ClientHandle::new("bob", Unreachable);
        assert!(!handle.notify("a.txt"));
        // Backpressure drops the push but keeps the client active.
        assert!(handle.is_active());
    }

    #[test]
    fn test_closed_channel_deactivates() {
        let (tx, rx) = mpsc::channel::<String>(1);
        drop(rx);
        let handle = ClientHandle::new("carol", tx);
        assert!(!handle.notify("a.txt"));
        assert!(!handle.is_active());
    }

    #[test]
    fn test_full_channel_reports_backpressure() {
        let (tx, _rx) = mpsc::channel::<String>(1);
        assert_eq!(tx.push("a"), Ok(()));
        assert_eq!(tx.push("b"), Err(NotifyError::Backpressure));
    }
}
