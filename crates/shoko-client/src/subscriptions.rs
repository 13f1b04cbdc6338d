//! Server-push event types.
//!
//! Pushes reach the client two ways. An [`InvalidationHandler`] installed at
//! connect time is called synchronously by the reader task, in frame order,
//! before any later reply is delivered; this is what keeps a cache coherent.
//! The same events are then republished as [`ServerEvent`]s on a broadcast
//! channel for anyone who only wants to watch.

/// Events pushed from server to client via broadcast.
///
/// Subscribe via [`RpcClient::subscribe_events()`](crate::RpcClient::subscribe_events).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// The server says any cached copy of `name` is stale.
    CacheInvalidated { name: String },
    /// The server could not queue every invalidation; nothing cached is current.
    AllInvalidated,
    /// The connection ended. Invalidations may have been missed.
    Disconnected,
}

/// Receives pushes in the order the server sent them.
///
/// Called from the connection's reader task; implementations must not block.
pub trait InvalidationHandler: Send + Sync {
    fn invalidate_cache(&self, name: &str);

    /// Everything cached may be stale.
    fn invalidate_all(&self);

    /// The connection is gone and later pushes will never arrive.
    fn connection_lost(&self) {}
}
