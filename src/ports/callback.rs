use super::PortError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of the completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactNotice {
    pub url: String,
    pub size: u64,
}

/// Outbound notification that a finished artifact is available.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactCallback: Send + Sync {
    async fn notify(&self, identity: &str, notice: &ArtifactNotice) -> Result<(), PortError>;
}
