//! Shared server state.

use std::sync::Arc;

use shoko_kernel::{CacheCoordinator, FileStore};

use crate::config::ServerConfig;

/// Everything a connection needs, built once at startup.
///
/// Each context owns an independent store and coordinator, so tests can run
/// several servers side by side in one process.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub store: Arc<FileStore>,
    pub coordinator: Arc<CacheCoordinator>,
    pub config: Arc<ServerConfig>,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = Arc::new(CacheCoordinator::new());
        let store = Arc::new(FileStore::new(coordinator.clone()));
        Self {
            store,
            coordinator,
            config: Arc::new(config),
        }
    }
}
