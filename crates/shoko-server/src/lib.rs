//! shoko server library
//!
//! Serves a [`FileStore`](shoko_kernel::FileStore) over TCP and pushes cache
//! invalidations to registered clients on the same connection.

pub mod config;
pub mod constants;
pub mod context;
pub mod rpc;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use context::ServerContext;
pub use rpc::{FileService, PushChannel, PushQueue, Session, push_channel};
pub use server::{FileServer, ServerError};
