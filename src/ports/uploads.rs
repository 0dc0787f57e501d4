use super::PortError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Owner of an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub user_id: String,
    pub application_id: String,
}

/// Record handed to the persistence collaborator for a published upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUpload {
    pub url: String,
    pub file_type: String,
    pub size: u64,
    pub application_id: String,
    pub user_id: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Looks up the owner of `api_key`; `None` when the key is unknown.
    async fn resolve(&self, api_key: &str) -> Result<Option<Owner>, PortError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadPublisher: Send + Sync {
    async fn publish(&self, upload: &NewUpload) -> Result<(), PortError>;
}
