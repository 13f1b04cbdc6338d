//! Read-through caching client.

use std::sync::Arc;

use tokio::net::ToSocketAddrs;

use crate::ConnectError;
use crate::cache::FileCache;
use crate::rpc::{ConnectOptions, RpcClient, RpcError};

/// An [`RpcClient`] registered for invalidations, fronted by a [`FileCache`].
pub struct CachingClient {
    rpc: RpcClient,
    cache: Arc<FileCache>,
    identity: String,
}

impl CachingClient {
    /// Connect, look up the service, and register `identity` for pushes.
    pub async fn connect(addr: impl ToSocketAddrs, identity: &str) -> Result<Self, ConnectError> {
        Self::connect_with(addr, identity, ConnectOptions::default()).await
    }

    /// Like [`connect`](Self::connect); any handler in `options` is replaced by the cache.
    pub async fn connect_with(
        addr: impl ToSocketAddrs,
        identity: &str,
        options: ConnectOptions,
    ) -> Result<Self, ConnectError> {
        let cache = Arc::new(FileCache::new());
        let rpc = RpcClient::connect_with(addr, options.with_handler(cache.clone())).await?;
        rpc.register(identity).await?;
        log::info!("registered for cache invalidations as {}", identity);
        Ok(Self {
            rpc,
            cache,
            identity: identity.to_owned(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Serve from cache, or fetch and fill it.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, RpcError> {
        if let Some(data) = self.cache.get(name) {
            return Ok(data);
        }
        let seen = self.cache.generation();
        let data = self.rpc.read(name).await?;
        self.cache.insert_if_current(name, data.clone(), seen);
        Ok(data)
    }

    pub async fn create(&self, name: &str, data: impl Into<Vec<u8>>) -> Result<(), RpcError> {
        self.rpc.create(name, data).await
    }

    pub async fn modify(&self, name: &str, data: impl Into<Vec<u8>>) -> Result<(), RpcError> {
        let result = self.rpc.modify(name, data).await;
        self.cache.invalidate(name);
        result
    }

    pub async fn delete(&self, name: &str) -> Result<(), RpcError> {
        let result = self.rpc.delete(name).await;
        self.cache.invalidate(name);
        result
    }

    pub async fn rename(&self, name: &str, new_name: &str) -> Result<(), RpcError> {
        let result = self.rpc.rename(name, new_name).await;
        self.cache.invalidate(name);
        self.cache.invalidate(new_name);
        result
    }

    pub async fn list(&self) -> Result<Vec<String>, RpcError> {
        self.rpc.list().await
    }
}
