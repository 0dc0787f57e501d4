//! Redis connection pool and the JSON value helpers the ports are built on.

use super::error::StoreError;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Redis-backed adapter for tracking records, API keys and upload records.
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Connections are opened lazily, so this succeeds without a reachable
    /// server.
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(redis_url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        Ok(self.pool.get().await?)
    }

    pub(super) async fn set_json<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(value).map_err(StoreError::record(key))?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, json).await?;
        Ok(())
    }

    /// `None` when the key does not exist.
    pub(super) async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn.get(key).await?;
        json.map(|data| serde_json::from_str(&data).map_err(StoreError::record(key)))
            .transpose()
    }

    pub(super) async fn push_json<T>(&self, list: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(value).map_err(StoreError::record(list))?;
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(list, json).await?;
        Ok(())
    }

    pub(super) async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
