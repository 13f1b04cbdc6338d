//! The file directory and its six operations.
//!
//! # Locking
//!
//! - `create`, `delete` and `rename` each do a check-then-act on the
//!   directory, so they all take the structural mutex for their full duration.
//! - `read` and `modify` resolve the record with a single map lookup and then
//!   only take that record's lock. Unrelated files are read and written fully
//!   in parallel, and never wait on a structural operation for a different
//!   name beyond the map shard access.
//! - A record is retired inside the structural section before the mutex is
//!   released. A `read`/`modify` that resolved the record just before removal
//!   observes the retirement and fails with not-found.
//!
//! Invalidations for `delete` and `rename` are broadcast while the structural
//! mutex is still held, so their pushes leave in the same order the directory
//! changes were made. Pushes never block.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::coordinator::CacheCoordinator;
use crate::error::{StoreError, StoreResult};
use crate::record::FileRecord;

/// In-memory directory of named files.
#[derive(Debug)]
pub struct FileStore {
    files: DashMap<String, Arc<FileRecord>>,
    structure: Mutex<()>,
    coordinator: Arc<CacheCoordinator>,
}

impl FileStore {
    /// Create an empty store that reports changes to `coordinator`.
    pub fn new(coordinator: Arc<CacheCoordinator>) -> Self {
        Self {
            files: DashMap::new(),
            structure: Mutex::new(()),
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }

    /// Bind `name` to a new file holding `data`.
    pub fn create(&self, name: &str, data: Vec<u8>) -> StoreResult<()> {
        require_name(name, "a file name is required to create a file")?;

        let _structure = self.structure.lock();
        if self.files.contains_key(name) {
            return Err(StoreError::already_exists(name));
        }
        self.files
            .insert(name.to_owned(), Arc::new(FileRecord::new(name, data)));

        tracing::debug!(name, "file created");
        Ok(())
    }

    /// Remove `name` and invalidate cached copies.
    pub fn delete(&self, name: &str) -> StoreResult<()> {
        require_name(name, "a file name is required to delete a file")?;

        let _structure = self.structure.lock();
        let (_, record) = self
            .files
            .remove(name)
            .ok_or_else(|| StoreError::not_found(name))?;
        record.retire();

        tracing::debug!(name, "file deleted");
        self.coordinator.broadcast_invalidation(record.name());
        Ok(())
    }

    /// Current contents of `name`.
    pub fn read(&self, name: &str) -> StoreResult<Vec<u8>> {
        require_name(name, "a file name is required to read a file")?;

        self.resolve(name)?
            .read()
            .ok_or_else(|| StoreError::not_found(name))
    }

    /// Replace the contents of `name`.
    ///
    /// Clients are only told about writes that actually change the bytes.
    pub fn modify(&self, name: &str, data: Vec<u8>) -> StoreResult<()> {
        require_name(name, "a file name is required to modify a file")?;

        let changed = self
            .resolve(name)?
            .modify(data)
            .ok_or_else(|| StoreError::not_found(name))?;

        if changed {
            tracing::debug!(name, "file modified");
            self.coordinator.broadcast_invalidation(name);
        } else {
            tracing::trace!(name, "modify left contents unchanged");
        }
        Ok(())
    }

    /// Move the contents of `name` to `new_name`.
    ///
    /// The old record is retired and a fresh one is bound under `new_name`.
    /// Invalidation goes out under the old name, since that is the name
    /// clients cached it by.
    pub fn rename(&self, name: &str, new_name: &str) -> StoreResult<()> {
        if name.is_empty() || new_name.is_empty() {
            return Err(StoreError::invalid_argument(
                "both a file name and a new file name are required to rename a file",
            ));
        }

        let _structure = self.structure.lock();
        if self.files.contains_key(new_name) {
            return Err(StoreError::already_exists(new_name));
        }
        let (_, record) = self
            .files
            .remove(name)
            .ok_or_else(|| StoreError::not_found(name))?;

        // Retiring hands back the last payload under the record's write lock,
        // so no modify can land between the copy and the retirement.
        let data = record
            .retire()
            .ok_or_else(|| StoreError::not_found(name))?;
        self.files
            .insert(new_name.to_owned(), Arc::new(FileRecord::new(new_name, data)));

        tracing::debug!(name, new_name, "file renamed");
        self.coordinator.broadcast_invalidation(record.name());
        Ok(())
    }

    /// Snapshot of all current names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a live record. The map guard is dropped before returning.
    fn resolve(&self, name: &str) -> StoreResult<Arc<FileRecord>> {
        self.files
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found(name))
    }
}

fn require_name(name: &str, msg: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_argument(msg));
    }
    Ok(())
}
