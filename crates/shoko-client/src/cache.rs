//! Client-side file cache kept coherent by server invalidations.
//!
//! Reads fill the cache; the server's `invalidate_cache` pushes evict entries.
//! A fetch that raced with an invalidation must not repopulate the cache with
//! the data it fetched, so every invalidation bumps a generation counter and
//! [`FileCache::insert_if_current`] refuses inserts started under an older
//! generation.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::subscriptions::InvalidationHandler;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Vec<u8>>,
    generation: u64,
}

/// Cached file contents, keyed by name.
#[derive(Default)]
pub struct FileCache {
    state: RwLock<CacheState>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.state.read().entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().entries.contains_key(name)
    }

    /// Current generation. Capture before fetching, pass to
    /// [`insert_if_current`](Self::insert_if_current) afterwards.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Cache `data` unless an invalidation arrived since `seen` was read.
    pub fn insert_if_current(&self, name: &str, data: Vec<u8>, seen: u64) -> bool {
        let mut state = self.state.write();
        if state.generation != seen {
            tracing::trace!(name, seen, current = state.generation, "skipping stale cache fill");
            return false;
        }
        state.entries.insert(name.to_owned(), data);
        true
    }

    /// Drop `name`. Returns whether an entry was cached.
    pub fn invalidate(&self, name: &str) -> bool {
        let mut state = self.state.write();
        state.generation += 1;
        state.entries.remove(name).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvalidationHandler for FileCache {
    fn invalidate_cache(&self, name: &str) {
        if self.invalidate(name) {
            log::debug!("evicted {} from cache", name);
        }
    }

    fn invalidate_all(&self) {
        self.clear();
    }

    fn connection_lost(&self) {
        // Pushes sent while disconnected are lost, so nothing cached can be trusted.
        self.clear();
    }
}
