use super::PortError;
use crate::domain::jobs::ActiveTranscoding;
use async_trait::async_trait;

/// External key-value record of which progress channels are live, one record
/// per run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActiveTranscodingStore: Send + Sync {
    /// Stores the channel list of the run described by `record`.
    async fn set_active(&self, record: &ActiveTranscoding) -> Result<(), PortError>;

    /// Drops that run's record, leaving other runs of the same caller alone.
    async fn remove_active(&self, record: &ActiveTranscoding) -> Result<(), PortError>;
}
