//! Registry of observers and invalidation fan-out.
//!
//! The coordinator is the single source of truth for who must be told when a
//! file changes. It is built once per server context and lives as long as the
//! server does; there is no teardown.
//!
//! # Delivery
//!
//! `broadcast_invalidation` walks a snapshot of the registry, so registering a
//! client never waits on a broadcast in progress and vice versa. Each push is
//! independent: one observer failing is logged and the loop moves on. Delivery
//! is at-most-once and never retried; an observer that misses a push stays
//! stale until something else corrects it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::client::ClientHandle;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Pushes accepted by the observer's channel.
    pub delivered: usize,
    /// Pushes that failed (and were logged).
    pub failed: usize,
    /// Inactive handles that were not tried.
    pub skipped: usize,
}

/// Process-wide registry of [`ClientHandle`]s.
#[derive(Debug, Default)]
pub struct CacheCoordinator {
    clients: RwLock<HashMap<String, Arc<ClientHandle>>>,
}

impl CacheCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle, replacing any handle with the same identity.
    ///
    /// A replaced handle is deactivated so nothing is pushed through its old
    /// channel again. Returns the handle that was replaced, if any.
    pub fn register(&self, handle: Arc<ClientHandle>) -> Option<Arc<ClientHandle>> {
        let identity = handle.identity().to_owned();
        let previous = self.clients.write().insert(identity.clone(), handle);
        match &previous {
            Some(old) => {
                old.deactivate();
                tracing::info!(identity = %identity, "client re-registered, previous session replaced");
            }
            None => tracing::info!(identity = %identity, "client registered"),
        }
        previous
    }

    /// Push an invalidation for `name` to every active observer.
    pub fn broadcast_invalidation(&self, name: &str) -> BroadcastReport {
        let targets: Vec<Arc<ClientHandle>> = self.clients.read().values().cloned().collect();

        let mut report = BroadcastReport::default();
        for client in targets {
            if !client.is_active() {
                report.skipped += 1;
                continue;
            }
            if client.notify(name) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        tracing::debug!(
            name,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "invalidation broadcast"
        );
        report
    }

    pub fn get(&self, identity: &str) -> Option<Arc<ClientHandle>> {
        self.clients.read().get(identity).cloned()
    }

    /// Deactivate `handle` only if it is still the registered instance.
    ///
    /// Used when a connection ends: if the identity has since re-registered
    /// from another connection, the newer session is left alone.
    pub fn deactivate_handle(&self, handle: &Arc<ClientHandle>) -> bool {
        let clients = self.clients.read();
        match clients.get(handle.identity()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                current.deactivate();
                true
            }
            _ => false,
        }
    }

    /// Number of registered handles, active or not.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.clients.read().values().filter(|c| c.is_active()).count()
    }

    /// Identities of handles that have been deactivated.
    pub fn inactive_identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self
            .clients
            .read()
            .values()
            .filter(|c| !c.is_active())
            .map(|c| c.identity().to_owned())
            .collect();
        identities.sort();
        identities
    }

    /// Drop every inactive handle. Returns how many were removed.
    pub fn prune_inactive(&self) -> usize {
        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|_, c| c.is_active());
        let removed = before - clients.len();
        if removed > 0 {
            tracing::info!(removed, "pruned inactive clients");
        }
        removed
    }
}
