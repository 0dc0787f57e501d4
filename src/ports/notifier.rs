use super::PortError;
use crate::domain::jobs::ProgressEvent;
use async_trait::async_trait;

/// Publish/subscribe transport for progress events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), PortError>;
}
