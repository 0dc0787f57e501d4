use crate::domain::hls::SegmentEntry;
use crate::domain::resolution::Resolution;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        source: std::io::Error,
    },
    #[error("{program} exited with {code:?}: {stderr}")]
    Exit {
        program: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("duration lookup failed: {0}")]
    Duration(String),
    #[error("encoder produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The external encode capability, treated as a black box.
#[async_trait]
pub trait EncoderPort: Send + Sync {
    /// Encodes `source` at `resolution` into `output`, sending completion
    /// fractions on `progress` as they become available. The sender is
    /// dropped when the encode ends.
    async fn encode(
        &self,
        source: &Path,
        resolution: Resolution,
        bitrate: &str,
        output: &Path,
        progress: mpsc::Sender<f64>,
    ) -> Result<(), EncodeError>;

    /// Splits an encoded variant into fixed-length segments named
    /// `{prefix}_NNN.ts` inside `out_dir` and reports them in order.
    async fn segment(
        &self,
        variant: &Path,
        out_dir: &Path,
        prefix: &str,
        segment_seconds: u32,
    ) -> Result<Vec<SegmentEntry>, EncodeError>;

    /// Writes one frame every `interval_secs` as `{prefix}_%d.jpg`.
    async fn scrub_strip(
        &self,
        source: &Path,
        out_dir: &Path,
        prefix: &str,
        interval_secs: u32,
        width: u32,
    ) -> Result<(), EncodeError>;

    /// Writes the single frame found at `offset` (`HH:MM:SS.mmm`) to `output`.
    async fn extract_frame(
        &self,
        source: &Path,
        offset: &str,
        output: &Path,
    ) -> Result<(), EncodeError>;
}
