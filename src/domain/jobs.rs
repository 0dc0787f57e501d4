use super::resolution::Resolution;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Terminal (or running) state of one resolution's encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed(String),
    TimedOut,
    Cancelled,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

/// One (source, resolution) encode within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub resolution: Resolution,
    pub output_path: PathBuf,
    /// Progress channel this job publishes to.
    pub channel: String,
    /// Last reported completion fraction, 0.0 to 1.0.
    pub progress: f64,
    pub status: JobStatus,
}

impl TranscodeJob {
    pub fn new(source: &Path, resolution: Resolution) -> Self {
        Self {
            resolution,
            output_path: variant_path(source, resolution),
            channel: progress_channel(&file_id(source), resolution),
            progress: 0.0,
            status: JobStatus::Running,
        }
    }
}

/// Lifecycle of a transcode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Running,
    Completing,
    Succeeded,
    PartialFailure,
}

impl RunState {
    /// Created -> Running -> Completing -> Succeeded | PartialFailure.
    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Created, RunState::Running)
                | (RunState::Running, RunState::Completing)
                | (RunState::Completing, RunState::Succeeded)
                | (RunState::Completing, RunState::PartialFailure)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::PartialFailure)
    }
}

/// Caller-facing summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeReport {
    /// 1 when every job succeeded, 0 otherwise.
    pub status: u8,
    pub message: String,
    pub state: RunState,
    pub jobs: Vec<TranscodeJob>,
}

impl TranscodeReport {
    pub fn from_jobs(jobs: Vec<TranscodeJob>) -> Self {
        let failed = jobs.iter().filter(|job| !job.status.is_success()).count();
        if failed == 0 {
            Self {
                status: 1,
                message: "Transcode complete".to_string(),
                state: RunState::Succeeded,
                jobs,
            }
        } else {
            Self {
                status: 0,
                message: format!("Transcode finished with {} of {} jobs failed", failed, jobs.len()),
                state: RunState::PartialFailure,
                jobs,
            }
        }
    }

    pub fn job(&self, resolution: Resolution) -> Option<&TranscodeJob> {
        self.jobs.iter().find(|job| job.resolution == resolution)
    }
}

/// Record kept in the external store while a run is live. Each run owns its
/// own record, so concurrent runs for one caller never share a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTranscoding {
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "uploadId")]
    pub file_id: String,
    pub qualities: Vec<Resolution>,
    #[serde(rename = "apiKey")]
    pub identity: String,
}

impl ActiveTranscoding {
    pub fn channels(&self) -> Vec<String> {
        self.qualities
            .iter()
            .map(|quality| progress_channel(&self.file_id, *quality))
            .collect()
    }
}

/// One progress tick bound for subscribers of `channel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub channel: String,
    pub event: String,
    pub progress: String,
}

impl ProgressEvent {
    pub const NAME: &'static str = "progress";

    pub fn new(channel: impl Into<String>, fraction: f64) -> Self {
        Self {
            channel: channel.into(),
            event: Self::NAME.to_string(),
            progress: format!("{:.2}", fraction.clamp(0.0, 1.0)),
        }
    }

    /// Payload sent to the transport: `{"progress": "0.42"}`.
    pub fn data(&self) -> serde_json::Value {
        serde_json::json!({ "progress": self.progress })
    }
}

/// Identity of a source file: its stem (`media/abc.mp4` -> `abc`).
pub fn file_id(source: &Path) -> String {
    source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn progress_channel(file_id: &str, resolution: Resolution) -> String {
    format!("transcoding-{}-quality-{}", file_id, resolution.label())
}

/// `media/abc.mp4` at 480p -> `media/abc_480.mp4`.
pub fn variant_path(source: &Path, resolution: Resolution) -> PathBuf {
    source.with_file_name(format!("{}_{}.mp4", file_id(source), resolution.height()))
}

/// Directory holding playlists, segments and scrub frames for a source.
pub fn derivatives_dir(source: &Path) -> PathBuf {
    source.with_file_name(file_id(source))
}
