//! Errors raised by the Redis adapter before they cross a port boundary.

use deadpool_redis::CreatePoolError;
use thiserror::Error;

pub type RedisError = deadpool_redis::redis::RedisError;
pub type PoolError = deadpool_redis::PoolError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid redis configuration: {0}")]
    CreatePool(#[from] CreatePoolError),
    #[error("no redis connection available: {0}")]
    Pool(#[from] PoolError),
    #[error("redis command failed: {0}")]
    Redis(#[from] RedisError),
    /// A stored value that is not the JSON the key should hold, or a value
    /// that could not be encoded for it.
    #[error("malformed record at {key}: {source}")]
    Record {
        key: String,
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(super) fn record(key: &str) -> impl FnOnce(serde_json::Error) -> StoreError {
        let key = key.to_string();
        move |source| StoreError::Record { key, source }
    }
}
