//! Pulls remote media into the media root so it can be transcoded.

use crate::domain::upload::is_safe_segment;
use futures::TryStreamExt;
use reqwest::Client;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("download failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct Downloaded {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    media_root: PathBuf,
}

impl HttpDownloader {
    pub fn new(client: Client, media_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            media_root: media_root.into(),
        }
    }

    /// Streams `url` to `{media_root}/{file_name}`. The body is written to a
    /// hidden `.part` file and renamed once complete.
    pub async fn download(&self, url: &str, file_name: &str) -> Result<Downloaded, DownloadError> {
        if !is_safe_segment(file_name) || file_name.starts_with('.') {
            return Err(DownloadError::InvalidName(file_name.to_string()));
        }
        let target = self.media_root.join(file_name);
        let partial = self.media_root.join(format!(".{}.part", file_name));

        let response = self.client.get(url).send().await?.error_for_status()?;
        let size = match write_body(&partial, response).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(path = %partial.display(), error = %cleanup, "failed to remove partial download");
                    }
                }
                return Err(e);
            }
        };

        fs::rename(&partial, &target)
            .await
            .map_err(|source| DownloadError::Io {
                path: target.clone(),
                source,
            })?;
        info!(url, path = %target.display(), size, "download complete");
        Ok(Downloaded { path: target, size })
    }
}

async fn write_body(path: &Path, response: reqwest::Response) -> Result<u64, DownloadError> {
    let io_error = |source: io::Error| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let body = response
        .bytes_stream()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let reader = StreamReader::new(body);
    futures::pin_mut!(reader);

    let mut file = BufWriter::new(File::create(path).await.map_err(io_error)?);
    let size = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(io_error)?;
    file.flush().await.map_err(io_error)?;
    Ok(size)
}
