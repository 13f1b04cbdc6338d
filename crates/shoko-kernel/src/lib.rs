//! # shoko-kernel
//!
//! The file store and the cache-invalidation fan-out behind the shoko file
//! service.
//!
//! - [`FileRecord`] - one named payload behind its own read/write lock
//! - [`FileStore`] - the directory of records and the six file operations
//! - [`ClientHandle`] - a remote observer reachable through an [`InvalidationSink`]
//! - [`CacheCoordinator`] - registry of observers; broadcasts invalidations
//!
//! # Concurrency Model
//!
//! ```text
//! create / delete / rename ──► structural Mutex ──► DashMap<name, Arc<FileRecord>>
//! read / modify ─────────────────────────────────► DashMap lookup ──► record RwLock
//! register / broadcast ──────► coordinator RwLock (independent of both)
//! ```
//!
//! Structural operations serialize on one mutex; content operations only take
//! the lock of the record they touch. A record removed from the directory is
//! retired, so a reference resolved just before removal cannot read or write
//! through it.

pub mod client;
pub mod coordinator;
mod error;
pub mod record;
pub mod store;

pub use client::{ClientHandle, InvalidationSink, NotifyError};
pub use coordinator::{BroadcastReport, CacheCoordinator};
pub use error::{StoreError, StoreResult};
pub use record::FileRecord;
pub use store::FileStore;
