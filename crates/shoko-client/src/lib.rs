//! shoko RPC client library
//!
//! Provides a typed client for the shoko file service, plus a local file
//! cache that the server keeps coherent by pushing invalidations.

pub mod cache;
pub mod cached;
pub mod constants;
pub mod rpc;
pub mod subscriptions;

use std::time::Duration;

pub use cache::FileCache;
pub use cached::CachingClient;
pub use rpc::{ConnectOptions, RpcClient, RpcError};
pub use subscriptions::{InvalidationHandler, ServerEvent};

/// Connect to a server on `host:port` and look up the default service.
pub async fn connect_tcp(host: &str, port: u16) -> Result<RpcClient, ConnectError> {
    RpcClient::connect((host, port)).await
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}
