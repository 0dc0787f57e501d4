use crate::ports::encoder::{EncodeError, EncoderPort};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

/// Offset of the extracted frame.
pub const THUMBNAIL_OFFSET: &str = "00:00:01.000";

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("frame extraction failed: {0}")]
    Extract(#[from] EncodeError),
    #[error("extracted frame at {0} is empty")]
    Empty(PathBuf),
    #[error("failed to read extracted frame: {0}")]
    Read(std::io::Error),
    #[error("failed to remove {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `media/abc.mp4` -> `media/abc.mp4_thumbnail.jpeg`.
pub fn thumbnail_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push("_thumbnail.jpeg");
    PathBuf::from(name)
}

pub struct ThumbnailService<E> {
    encoder: Arc<E>,
}

impl<E> Clone for ThumbnailService<E> {
    fn clone(&self) -> Self {
        Self {
            encoder: self.encoder.clone(),
        }
    }
}

impl<E: EncoderPort> ThumbnailService<E> {
    pub fn new(encoder: Arc<E>) -> Self {
        Self { encoder }
    }

    /// Extracts one frame from `source` and returns its bytes. The source and
    /// the frame file are removed whether or not extraction worked; an
    /// extraction error wins over a cleanup error.
    pub async fn extract(&self, source: &Path) -> Result<Vec<u8>, ThumbnailError> {
        let output = thumbnail_path(source);

        let frame = self.read_frame(source, &output).await;
        let cleanup = remove_all(&[source, output.as_path()]).await;
        let bytes = frame?;
        cleanup?;

        info!(source = %source.display(), size = bytes.len(), "thumbnail extracted");
        Ok(bytes)
    }

    async fn read_frame(&self, source: &Path, output: &Path) -> Result<Vec<u8>, ThumbnailError> {
        self.encoder
            .extract_frame(source, THUMBNAIL_OFFSET, output)
            .await?;

        let bytes = fs::read(output).await.map_err(ThumbnailError::Read)?;
        if bytes.is_empty() {
            return Err(ThumbnailError::Empty(output.to_path_buf()));
        }
        Ok(bytes)
    }
}

/// Removes every path, logging each failure. Files that never appeared count
/// as removed.
async fn remove_all(paths: &[&Path]) -> Result<(), ThumbnailError> {
    let mut first_error = None;
    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "thumbnail cleanup failed");
                first_error.get_or_insert(ThumbnailError::Cleanup {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hls::SegmentEntry;
    use crate::domain::resolution::Resolution;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// Writes `frame` as the extracted image, or fails when it is `None`.
    struct FrameEncoder {
        frame: Option<Vec<u8>>,
    }

    #[async_trait]
    impl EncoderPort for FrameEncoder {
        async fn encode(
            &self,
            _source: &Path,
            _resolution: Resolution,
            _bitrate: &str,
            _output: &Path,
            _progress: mpsc::Sender<f64>,
        ) -> Result<(), EncodeError> {
            unreachable!()
        }

        async fn segment(
            &self,
            _variant: &Path,
            _out_dir: &Path,
            _prefix: &str,
            _segment_seconds: u32,
        ) -> Result<Vec<SegmentEntry>, EncodeError> {
            unreachable!()
        }

        async fn scrub_strip(
            &self,
            _source: &Path,
            _out_dir: &Path,
            _prefix: &str,
            _interval_secs: u32,
            _width: u32,
        ) -> Result<(), EncodeError> {
            unreachable!()
        }

        async fn extract_frame(
            &self,
            _source: &Path,
            offset: &str,
            output: &Path,
        ) -> Result<(), EncodeError> {
            assert_eq!(offset, THUMBNAIL_OFFSET);
            match &self.frame {
                Some(frame) => Ok(fs::write(output, frame).await?),
                None => Err(EncodeError::Exit {
                    program: "ffmpeg",
                    code: Some(1),
                    stderr: "no video stream".into(),
                }),
            }
        }
    }

    fn source(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("upload.mp4");
        std::fs::write(&path, b"video").unwrap();
        path
    }

    #[tokio::test]
    async fn returns_frame_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);
        let service = ThumbnailService::new(Arc::new(FrameEncoder {
            frame: Some(vec![0xFF, 0xD8, 0xFF]),
        }));

        let bytes = service.extract(&source).await.unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
        assert!(!source.exists());
        assert!(!thumbnail_path(&source).exists());
    }

    #[tokio::test]
    async fn empty_frame_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);
        let service = ThumbnailService::new(Arc::new(FrameEncoder {
            frame: Some(Vec::new()),
        }));

        assert!(matches!(
            service.extract(&source).await,
            Err(ThumbnailError::Empty(_))
        ));
        assert!(!source.exists());
        assert!(!thumbnail_path(&source).exists());
    }

    #[tokio::test]
    async fn extraction_failure_still_removes_source() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);
        let service = ThumbnailService::new(Arc::new(FrameEncoder { frame: None }));

        assert!(matches!(
            service.extract(&source).await,
            Err(ThumbnailError::Extract(_))
        ));
        assert!(!source.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn thumbnail_sits_beside_source() {
        assert_eq!(
            thumbnail_path(Path::new("media/abc.mp4")),
            PathBuf::from("media/abc.mp4_thumbnail.jpeg")
        );
    }
}
