//! Redis ActiveTranscodingStore implementation.

use super::pool::RedisPool;
use super::tracking_key;
use crate::domain::jobs::ActiveTranscoding;
use crate::ports::tracking::ActiveTranscodingStore;
use crate::ports::PortError;
use async_trait::async_trait;

/// The value at `transcoding:{identity}:{run_id}` is the run's channel list.
#[async_trait]
impl ActiveTranscodingStore for RedisPool {
    async fn set_active(&self, record: &ActiveTranscoding) -> Result<(), PortError> {
        let key = tracking_key(&record.identity, &record.run_id);
        self.set_json(&key, &record.channels()).await?;
        Ok(())
    }

    async fn remove_active(&self, record: &ActiveTranscoding) -> Result<(), PortError> {
        self.delete(&tracking_key(&record.identity, &record.run_id))
            .await?;
        Ok(())
    }
}
