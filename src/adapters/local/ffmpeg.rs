//! `EncoderPort` backed by the ffmpeg and ffprobe executables.

use crate::domain::hls::SegmentEntry;
use crate::domain::resolution::Resolution;
use crate::ports::encoder::{EncodeError, EncoderPort};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::with_binaries(FFMPEG, FFPROBE)
    }
}

impl FfmpegEncoder {
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn ffmpeg(&self) -> TokioCommand {
        let mut command = TokioCommand::new(&self.ffmpeg);
        command
            .arg("-y")
            .arg("-nostdin")
            .arg("-loglevel")
            .arg("error")
            .kill_on_drop(true);
        command
    }

    /// Container duration in seconds.
    pub async fn media_duration(&self, media_path: &Path) -> Result<f64, EncodeError> {
        let output = TokioCommand::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(media_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: FFPROBE,
                source,
            })?;
        let output = check(FFPROBE, output)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration(&stdout)
            .ok_or_else(|| EncodeError::Duration(format!("no duration in {:?}", stdout.trim())))
    }
}

#[async_trait]
impl EncoderPort for FfmpegEncoder {
    async fn encode(
        &self,
        source: &Path,
        resolution: Resolution,
        bitrate: &str,
        output: &Path,
        progress: mpsc::Sender<f64>,
    ) -> Result<(), EncodeError> {
        // Without a duration the encode still runs, just without progress.
        let duration = match self.media_duration(source).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!(source = %source.display(), error = %e, "duration lookup failed");
                None
            }
        };

        let mut child = self
            .ffmpeg()
            .arg("-i")
            .arg(source)
            .arg("-s")
            .arg(resolution.label())
            .arg("-b:v")
            .arg(bitrate)
            .arg("-progress")
            .arg("pipe:1")
            .arg("-nostats")
            .arg(output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                program: FFMPEG,
                source,
            })?;
        debug!(resolution = %resolution, output = %output.display(), "ffmpeg started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let report = async {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(fraction) = parse_progress_line(&line, duration) {
                    let _ = progress.send(fraction).await;
                }
            }
        };
        let collect_stderr = async {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        };

        let (status, (), stderr_text) = tokio::join!(child.wait(), report, collect_stderr);
        let status = status?;
        if !status.success() {
            return Err(EncodeError::Exit {
                program: FFMPEG,
                code: status.code(),
                stderr: stderr_text.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn segment(
        &self,
        variant: &Path,
        out_dir: &Path,
        prefix: &str,
        segment_seconds: u32,
    ) -> Result<Vec<SegmentEntry>, EncodeError> {
        let list_path = out_dir.join(format!("{}.csv", prefix));
        let output = self
            .ffmpeg()
            .arg("-i")
            .arg(variant)
            .arg("-map")
            .arg("0")
            .arg("-c")
            .arg("copy")
            .arg("-f")
            .arg("segment")
            .arg("-segment_time")
            .arg(segment_seconds.to_string())
            .arg("-segment_format")
            .arg("mpegts")
            .arg("-segment_list")
            .arg(&list_path)
            .arg("-segment_list_type")
            .arg("csv")
            .arg(out_dir.join(format!("{}_%03d.ts", prefix)))
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: FFMPEG,
                source,
            })?;
        check(FFMPEG, output)?;

        let list = tokio::fs::read_to_string(&list_path).await?;
        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            debug!(path = %list_path.display(), error = %e, "segment list left behind");
        }
        Ok(parse_segment_list(&list))
    }

    async fn scrub_strip(
        &self,
        source: &Path,
        out_dir: &Path,
        prefix: &str,
        interval_secs: u32,
        width: u32,
    ) -> Result<(), EncodeError> {
        let output = self
            .ffmpeg()
            .arg("-i")
            .arg(source)
            .arg("-vf")
            .arg(format!("fps=1/{},scale={}:-1", interval_secs.max(1), width))
            .arg(out_dir.join(format!("{}_%d.jpg", prefix)))
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: FFMPEG,
                source,
            })?;
        check(FFMPEG, output)?;
        Ok(())
    }

    async fn extract_frame(
        &self,
        source: &Path,
        offset: &str,
        output: &Path,
    ) -> Result<(), EncodeError> {
        let result = self
            .ffmpeg()
            .arg("-ss")
            .arg(offset)
            .arg("-i")
            .arg(source)
            .arg("-vframes")
            .arg("1")
            .arg(output)
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: FFMPEG,
                source,
            })?;
        check(FFMPEG, result)?;
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(EncodeError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

fn check(program: &'static str, output: Output) -> Result<Output, EncodeError> {
    if output.status.success() {
        return Ok(output);
    }
    Err(EncodeError::Exit {
        program,
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .find(|duration| duration.is_finite() && *duration > 0.0)
}

/// Completion fraction from one line of `-progress` output.
///
/// Both `out_time_us` and `out_time_ms` carry microseconds.
pub fn parse_progress_line(line: &str, duration: Option<f64>) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(1.0),
        "out_time_us" | "out_time_ms" => {
            let duration = duration.filter(|d| *d > 0.0)?;
            let micros = value.parse::<i64>().ok()?;
            Some((micros.max(0) as f64 / 1_000_000.0 / duration).clamp(0.0, 1.0))
        }
        _ => None,
    }
}

/// Entries of a csv segment list: `name,start,end` per line.
pub fn parse_segment_list(list: &str) -> Vec<SegmentEntry> {
    list.lines()
        .filter_map(|line| {
            let mut fields = line.trim().split(',');
            let uri = fields.next()?.trim();
            let start = fields.next()?.trim().parse::<f64>().ok()?;
            let end = fields.next()?.trim().parse::<f64>().ok()?;
            (!uri.is_empty()).then(|| SegmentEntry {
                uri: uri.to_string(),
                duration: (end - start).max(0.0),
            })
        })
        .collect()
}
