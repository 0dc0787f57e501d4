//! Redis UploadPublisher implementation.

use super::pool::RedisPool;
use super::UPLOADS_LIST;
use crate::ports::uploads::{NewUpload, UploadPublisher};
use crate::ports::PortError;
use async_trait::async_trait;

#[async_trait]
impl UploadPublisher for RedisPool {
    async fn publish(&self, upload: &NewUpload) -> Result<(), PortError> {
        self.push_json(UPLOADS_LIST, upload).await?;
        Ok(())
    }
}
