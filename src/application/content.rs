//! Read-through serving of files under the media root.

use crate::domain::cache::WeightedCache;
use crate::domain::upload::normalize_relative;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid content path {0:?}")]
    InvalidPath(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Content {
    pub bytes: Bytes,
    pub from_cache: bool,
}

#[derive(Clone)]
pub struct ContentServer {
    cache: Arc<WeightedCache>,
    media_root: PathBuf,
}

impl ContentServer {
    pub fn new(cache: Arc<WeightedCache>, media_root: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            media_root: media_root.into(),
        }
    }

    pub fn cache(&self) -> &WeightedCache {
        &self.cache
    }

    /// Returns the file at `relative` (under the media root), from cache when
    /// present. A miss reads the disk, caches the payload and rebalances.
    pub async fn fetch(&self, relative: &str) -> Result<Content, ContentError> {
        let relative_path = normalize_relative(Path::new(relative))
            .ok_or_else(|| ContentError::InvalidPath(relative.to_string()))?;
        let path = self.media_root.join(relative_path);
        let key = path.to_string_lossy().into_owned();

        if let Some(bytes) = self.cache.get(&key) {
            debug!(key, "cache hit");
            return Ok(Content {
                bytes,
                from_cache: true,
            });
        }
        debug!(key, "cache miss");

        let bytes = match tokio::fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContentError::NotFound(relative.to_string()))
            }
            Err(e) => return Err(ContentError::Io { path, source: e }),
        };

        let mut evicted = self.cache.put(key, bytes.clone()).into_iter().count();
        evicted += self.cache.recalculate_weight().len();
        if evicted > 0 {
            debug!(evicted, total_bytes = self.cache.total_bytes(), "cache rebalanced");
        }

        Ok(Content {
            bytes,
            from_cache: false,
        })
    }
}
