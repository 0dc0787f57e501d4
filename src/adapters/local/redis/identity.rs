//! Redis IdentityResolver implementation.

use super::pool::RedisPool;
use crate::ports::uploads::{IdentityResolver, Owner};
use crate::ports::PortError;
use async_trait::async_trait;

/// API keys are stored as plain keys holding the owner as JSON.
#[async_trait]
impl IdentityResolver for RedisPool {
    async fn resolve(&self, api_key: &str) -> Result<Option<Owner>, PortError> {
        Ok(self.get_json(api_key).await?)
    }
}
