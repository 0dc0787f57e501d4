//! Multi-resolution transcode runs.
//!
//! A run validates its request, records its live progress channels under a
//! key of its own, encodes every resolution concurrently and waits for all of
//! them.
//! Succeeded variants are then segmented into playlists and announced through
//! the callback, while a scrub strip is cut from the source.

use super::notify::NotificationQueue;
use crate::domain::hls::MediaPlaylist;
use crate::domain::jobs::{
    derivatives_dir, file_id, variant_path, ActiveTranscoding, JobStatus, ProgressEvent,
    RunState, TranscodeJob, TranscodeReport,
};
use crate::domain::resolution::{parse_all, Resolution};
use crate::ports::callback::{ArtifactCallback, ArtifactNotice};
use crate::ports::encoder::{EncodeError, EncoderPort};
use crate::ports::tracking::ActiveTranscodingStore;
use crate::ports::PortError;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const SCRUB_WIDTH: u32 = 120;
const PROGRESS_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("invalid transcode request: {0}")]
    Validation(String),
    #[error("failed to write playlist: {0}")]
    Playlist(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeRequest {
    /// Source file, relative to the media root (or absolute inside it).
    #[serde(rename = "inputPath")]
    pub source: PathBuf,
    pub resolutions: Vec<String>,
    /// Caller identity, used for the tracking record and callbacks. Required.
    #[serde(default)]
    pub identity: String,
}

/// Playlist for one resolution of an existing file, without encoding.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistRequest {
    #[serde(rename = "inputPath")]
    pub source: PathBuf,
    #[serde(default = "default_playlist_resolution")]
    pub resolution: String,
}

fn default_playlist_resolution() -> String {
    Resolution::Medium.label()
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistReport {
    pub url: String,
    pub segments: usize,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub media_root: PathBuf,
    pub public_base_url: String,
    pub bitrate: String,
    pub segment_seconds: u32,
    pub scrub_interval_secs: u32,
    /// Per-job encode deadline. `None` waits for the encoder indefinitely.
    pub job_timeout: Option<Duration>,
}

/// A request that passed validation.
struct Run {
    id: String,
    source: PathBuf,
    media_root: PathBuf,
    resolutions: Vec<Resolution>,
    identity: String,
    state: RunState,
}

impl Run {
    fn advance(&mut self, next: RunState) {
        if !self.state.can_advance_to(next) {
            warn!(run_id = %self.id, from = ?self.state, to = ?next, "unexpected run state transition");
        }
        debug!(run_id = %self.id, from = ?self.state, to = ?next, "run state changed");
        self.state = next;
    }

    fn tracking_record(&self) -> ActiveTranscoding {
        ActiveTranscoding {
            run_id: self.id.clone(),
            file_id: file_id(&self.source),
            qualities: self.resolutions.clone(),
            identity: self.identity.clone(),
        }
    }
}

pub struct TranscodeOrchestrator<E, T, C> {
    encoder: Arc<E>,
    tracking: Arc<T>,
    callback: Arc<C>,
    notifications: NotificationQueue,
    config: Arc<OrchestratorConfig>,
}

impl<E, T, C> Clone for TranscodeOrchestrator<E, T, C> {
    fn clone(&self) -> Self {
        Self {
            encoder: self.encoder.clone(),
            tracking: self.tracking.clone(),
            callback: self.callback.clone(),
            notifications: self.notifications.clone(),
            config: self.config.clone(),
        }
    }
}

impl<E, T, C> TranscodeOrchestrator<E, T, C>
where
    E: EncoderPort,
    T: ActiveTranscodingStore,
    C: ArtifactCallback,
{
    pub fn new(
        encoder: E,
        tracking: T,
        callback: C,
        notifications: NotificationQueue,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            encoder: Arc::new(encoder),
            tracking: Arc::new(tracking),
            callback: Arc::new(callback),
            notifications,
            config: Arc::new(config),
        }
    }

    pub async fn transcode(
        &self,
        request: TranscodeRequest,
    ) -> Result<TranscodeReport, TranscodeError> {
        self.transcode_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Runs the request; cancelling `cancel` stops every job still encoding.
    pub async fn transcode_with_cancel(
        &self,
        request: TranscodeRequest,
        cancel: CancellationToken,
    ) -> Result<TranscodeReport, TranscodeError> {
        let mut run = self.validate(request).await?;

        let record = run.tracking_record();
        if let Err(e) = self.tracking.set_active(&record).await {
            warn!(run_id = %run.id, identity = %run.identity, error = %e, "failed to record active transcoding");
        }
        run.advance(RunState::Running);
        info!(
            run_id = %run.id,
            source = %run.source.display(),
            resolutions = ?run.resolutions,
            "transcode started"
        );

        let jobs = join_all(run.resolutions.iter().map(|&resolution| {
            self.run_job(
                &run.source,
                TranscodeJob::new(&run.source, resolution),
                cancel.child_token(),
            )
        }))
        .await;

        // Every job is terminal past this point.
        run.advance(RunState::Completing);
        if let Err(e) = self.tracking.remove_active(&record).await {
            warn!(run_id = %run.id, identity = %run.identity, error = %e, "failed to clear active transcoding");
        }

        self.generate_derivatives(&run, &jobs).await;

        let report = TranscodeReport::from_jobs(jobs);
        run.advance(report.state);
        info!(
            run_id = %run.id,
            source = %run.source.display(),
            status = report.status,
            dropped_notifications = self.notifications.dropped(),
            state = ?report.state,
            "transcode finished"
        );
        Ok(report)
    }

    async fn validate(&self, request: TranscodeRequest) -> Result<Run, TranscodeError> {
        let identity = request.identity.trim().to_string();
        if identity.is_empty() {
            return Err(TranscodeError::Validation(
                "caller identity is required".into(),
            ));
        }

        let resolutions = parse_all(request.resolutions.as_slice())
            .map_err(|e| TranscodeError::Validation(e.to_string()))?;
        if resolutions.is_empty() {
            return Err(TranscodeError::Validation(
                "at least one resolution is required".into(),
            ));
        }

        let (media_root, source) = self.resolve_source(&request.source).await?;

        Ok(Run {
            id: Uuid::new_v4().to_string(),
            source,
            media_root,
            resolutions,
            identity,
            state: RunState::Created,
        })
    }

    /// Canonical media root and source; the source must be a file inside it.
    async fn resolve_source(&self, requested: &Path) -> Result<(PathBuf, PathBuf), TranscodeError> {
        let media_root = fs::canonicalize(&self.config.media_root)
            .await
            .map_err(|e| TranscodeError::Validation(format!("media root unavailable: {}", e)))?;
        let source = fs::canonicalize(media_root.join(requested))
            .await
            .map_err(|_| {
                TranscodeError::Validation(format!("source {} does not exist", requested.display()))
            })?;
        if !source.starts_with(&media_root) {
            return Err(TranscodeError::Validation(format!(
                "source {} is outside the media root",
                requested.display()
            )));
        }
        let is_file = fs::metadata(&source)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(TranscodeError::Validation(format!(
                "source {} is not a file",
                requested.display()
            )));
        }
        Ok((media_root, source))
    }

    /// Writes `{stem}/{height}.m3u8` for one resolution without encoding.
    /// The `{stem}_{height}.mp4` variant is segmented when it exists,
    /// otherwise the source itself.
    pub async fn write_playlist(
        &self,
        request: PlaylistRequest,
    ) -> Result<PlaylistReport, TranscodeError> {
        let resolution = request
            .resolution
            .parse::<Resolution>()
            .map_err(|e| TranscodeError::Validation(e.to_string()))?;
        let (media_root, source) = self.resolve_source(&request.source).await?;

        let variant = variant_path(&source, resolution);
        let input = if fs::try_exists(&variant).await.unwrap_or(false) {
            variant
        } else {
            source.clone()
        };

        let out_dir = derivatives_dir(&source);
        let (playlist, segments) = async {
            fs::create_dir_all(&out_dir).await?;
            self.segment_playlist(&input, &out_dir, resolution).await
        }
        .await
        .map_err(|e| {
            error!(source = %source.display(), %resolution, error = %e, "playlist failed");
            TranscodeError::Playlist(e.to_string())
        })?;

        info!(input = %input.display(), playlist = %playlist.display(), segments, "playlist written");
        Ok(PlaylistReport {
            url: public_url(&self.config.public_base_url, &media_root, &playlist),
            segments,
        })
    }

    async fn run_job(
        &self,
        source: &Path,
        mut job: TranscodeJob,
        token: CancellationToken,
    ) -> TranscodeJob {
        let (progress_tx, mut progress_rx) = mpsc::channel::<f64>(PROGRESS_BUFFER);
        let output = job.output_path.clone();
        let encode = self.encoder.encode(
            source,
            job.resolution,
            &self.config.bitrate,
            &output,
            progress_tx,
        );

        let notifications = self.notifications.clone();
        let channel = job.channel.clone();
        let forward = async move {
            let mut last = 0.0;
            while let Some(fraction) = progress_rx.recv().await {
                last = fraction;
                notifications.publish(ProgressEvent::new(channel.as_str(), fraction));
            }
            last
        };

        let job_timeout = self.config.job_timeout;
        let deadline = async move {
            match job_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Losing branches drop the encode future, which kills the subprocess.
        let (status, progress) = tokio::select! {
            (result, last) = async { tokio::join!(encode, forward) } => {
                (settle(&output, result).await, last)
            }
            _ = token.cancelled() => (JobStatus::Cancelled, 0.0),
            _ = deadline => (JobStatus::TimedOut, 0.0),
        };
        job.status = status;
        job.progress = progress;

        match &job.status {
            JobStatus::Succeeded => {
                if job.progress < 1.0 {
                    job.progress = 1.0;
                    self.notifications
                        .publish(ProgressEvent::new(job.channel.as_str(), 1.0));
                }
                info!(resolution = %job.resolution, output = %job.output_path.display(), "encode succeeded");
            }
            status => {
                error!(resolution = %job.resolution, ?status, "encode failed");
            }
        }
        job
    }

    /// Second wave: playlists and callbacks for each succeeded variant, plus
    /// the scrub strip. Failures here are logged only.
    async fn generate_derivatives(&self, run: &Run, jobs: &[TranscodeJob]) {
        let out_dir = derivatives_dir(&run.source);
        if let Err(e) = fs::create_dir_all(&out_dir).await {
            warn!(path = %out_dir.display(), error = %e, "failed to create derivatives directory");
            return;
        }

        let variants = join_all(
            jobs.iter()
                .filter(|job| job.status.is_success())
                .map(|job| async {
                    if let Err(e) = self.publish_variant(run, job, &out_dir).await {
                        warn!(resolution = %job.resolution, error = %e, "failed to publish variant");
                    }
                }),
        );
        let scrub = async {
            let prefix = file_id(&run.source);
            match self
                .encoder
                .scrub_strip(
                    &run.source,
                    &out_dir,
                    &prefix,
                    self.config.scrub_interval_secs,
                    SCRUB_WIDTH,
                )
                .await
            {
                Ok(()) => debug!(source = %run.source.display(), "scrub strip written"),
                Err(e) => warn!(source = %run.source.display(), error = %e, "scrub strip failed"),
            }
        };
        futures::join!(variants, scrub);
    }

    async fn publish_variant(
        &self,
        run: &Run,
        job: &TranscodeJob,
        out_dir: &Path,
    ) -> Result<(), PortError> {
        self.segment_playlist(&job.output_path, out_dir, job.resolution)
            .await?;

        let size = fs::metadata(&job.output_path).await?.len();
        let notice = ArtifactNotice {
            url: public_url(&self.config.public_base_url, &run.media_root, &job.output_path),
            size,
        };
        self.callback.notify(&run.identity, &notice).await?;
        debug!(resolution = %job.resolution, url = %notice.url, "variant published");
        Ok(())
    }

    /// Segments `input` as `{height}_NNN.ts` and writes `{height}.m3u8` over
    /// them. Returns the playlist path and the segment count.
    async fn segment_playlist(
        &self,
        input: &Path,
        out_dir: &Path,
        resolution: Resolution,
    ) -> Result<(PathBuf, usize), PortError> {
        let prefix = resolution.height().to_string();
        let segments = self
            .encoder
            .segment(input, out_dir, &prefix, self.config.segment_seconds)
            .await?;
        let count = segments.len();
        let playlist = out_dir.join(format!("{}.m3u8", prefix));
        MediaPlaylist::vod(segments).write_to(&playlist).await?;
        Ok((playlist, count))
    }
}

async fn settle(output: &Path, result: Result<(), EncodeError>) -> JobStatus {
    match result {
        Ok(()) if fs::try_exists(output).await.unwrap_or(false) => JobStatus::Succeeded,
        Ok(()) => JobStatus::Failed(EncodeError::MissingOutput(output.to_path_buf()).to_string()),
        Err(e) => JobStatus::Failed(e.to_string()),
    }
}

/// URL of a file under the media root.
pub fn public_url(base: &str, media_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(media_root).unwrap_or(path);
    let relative = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", base.trim_end_matches('/'), relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hls::SegmentEntry;
    use crate::ports::callback::MockArtifactCallback;
    use crate::ports::notifier::MockProgressNotifier;
    use crate::ports::tracking::MockActiveTranscodingStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct FakeEncoder {
        fail: Vec<Resolution>,
        hang: Vec<Resolution>,
        slow: Vec<Resolution>,
        encoded: Arc<Mutex<Vec<Resolution>>>,
        segmented: Arc<Mutex<Vec<PathBuf>>>,
        scrubbed: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl EncoderPort for FakeEncoder {
        async fn encode(
            &self,
            _source: &Path,
            resolution: Resolution,
            _bitrate: &str,
            output: &Path,
            progress: mpsc::Sender<f64>,
        ) -> Result<(), EncodeError> {
            self.encoded.lock().unwrap().push(resolution);
            if self.hang.contains(&resolution) {
                std::future::pending::<()>().await;
            }
            if self.slow.contains(&resolution) {
                tokio::time::sleep(Duration::from_millis(400)).await;
            }
            if self.fail.contains(&resolution) {
                return Err(EncodeError::Exit {
                    program: "ffmpeg",
                    code: Some(1),
                    stderr: "encoder crashed".into(),
                });
            }
            let _ = progress.send(0.5).await;
            fs::write(output, b"variant").await?;
            let _ = progress.send(1.0).await;
            Ok(())
        }

        async fn segment(
            &self,
            variant: &Path,
            _out_dir: &Path,
            prefix: &str,
            segment_seconds: u32,
        ) -> Result<Vec<SegmentEntry>, EncodeError> {
            self.segmented.lock().unwrap().push(variant.to_path_buf());
            Ok(vec![SegmentEntry {
                uri: format!("{}_000.ts", prefix),
                duration: segment_seconds as f64,
            }])
        }

        async fn scrub_strip(
            &self,
            source: &Path,
            _out_dir: &Path,
            _prefix: &str,
            _interval_secs: u32,
            _width: u32,
        ) -> Result<(), EncodeError> {
            self.scrubbed.lock().unwrap().push(source.to_path_buf());
            Ok(())
        }

        async fn extract_frame(
            &self,
            _source: &Path,
            _offset: &str,
            _output: &Path,
        ) -> Result<(), EncodeError> {
            Ok(())
        }
    }

    fn config(media_root: &Path) -> OrchestratorConfig {
        OrchestratorConfig {
            media_root: media_root.to_path_buf(),
            public_base_url: "http://media.test/".into(),
            bitrate: "1000k".into(),
            segment_seconds: 10,
            scrub_interval_secs: 10,
            job_timeout: None,
        }
    }

    fn quiet_notifications() -> NotificationQueue {
        let mut notifier = MockProgressNotifier::new();
        notifier.expect_publish().returning(|_| Ok(()));
        NotificationQueue::start(notifier, 64).0
    }

    /// Expects exactly one record to be set and then cleared for `key-1`.
    fn tracked_once() -> MockActiveTranscodingStore {
        let mut tracking = MockActiveTranscodingStore::new();
        tracking
            .expect_set_active()
            .withf(|record| record.identity == "key-1")
            .times(1)
            .returning(|_| Ok(()));
        tracking
            .expect_remove_active()
            .withf(|record| record.identity == "key-1")
            .times(1)
            .returning(|_| Ok(()));
        tracking
    }

    /// Tracking store keyed the way the Redis adapter keys it.
    #[derive(Clone, Default)]
    struct MemoryTracking {
        records: Arc<Mutex<HashMap<String, Vec<String>>>>,
    }

    #[async_trait]
    impl ActiveTranscodingStore for MemoryTracking {
        async fn set_active(&self, record: &ActiveTranscoding) -> Result<(), PortError> {
            self.records.lock().unwrap().insert(
                format!("{}:{}", record.identity, record.run_id),
                record.channels(),
            );
            Ok(())
        }

        async fn remove_active(&self, record: &ActiveTranscoding) -> Result<(), PortError> {
            self.records
                .lock()
                .unwrap()
                .remove(&format!("{}:{}", record.identity, record.run_id));
            Ok(())
        }
    }

    fn request(resolutions: &[&str]) -> TranscodeRequest {
        TranscodeRequest {
            source: PathBuf::from("abc.mp4"),
            resolutions: resolutions.iter().map(|r| r.to_string()).collect(),
            identity: "key-1".into(),
        }
    }

    fn media_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("abc.mp4"), b"source").unwrap();
        dir
    }

    #[tokio::test]
    async fn all_resolutions_succeed() {
        let dir = media_dir();
        let encoder = FakeEncoder::default();

        let mut tracking = MockActiveTranscodingStore::new();
        tracking
            .expect_set_active()
            .withf(|record| {
                record.identity == "key-1" && record.file_id == "abc" && !record.run_id.is_empty()
            })
            .times(1)
            .returning(|_| Ok(()));
        tracking
            .expect_remove_active()
            .withf(|record| record.identity == "key-1" && record.file_id == "abc")
            .times(1)
            .returning(|_| Ok(()));

        let mut callback = MockArtifactCallback::new();
        callback
            .expect_notify()
            .withf(|identity, notice| {
                identity == "key-1"
                    && notice.size == 7
                    && notice.url.starts_with("http://media.test/abc_")
            })
            .times(2)
            .returning(|_, _| Ok(()));

        let orchestrator = TranscodeOrchestrator::new(
            encoder.clone(),
            tracking,
            callback,
            quiet_notifications(),
            config(dir.path()),
        );
        let report = orchestrator
            .transcode(request(&["720p", "854x480"]))
            .await
            .unwrap();

        assert_eq!(report.status, 1);
        assert_eq!(report.message, "Transcode complete");
        assert!(dir.path().join("abc_720.mp4").exists());
        assert!(dir.path().join("abc_480.mp4").exists());
        assert!(dir.path().join("abc").join("720.m3u8").exists());
        assert!(dir.path().join("abc").join("480.m3u8").exists());
        assert_eq!(encoder.scrubbed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_failed_job_leaves_the_others() {
        let dir = media_dir();
        let encoder = FakeEncoder {
            fail: vec![Resolution::Medium],
            ..Default::default()
        };

        let mut callback = MockArtifactCallback::new();
        callback
            .expect_notify()
            .withf(|_, notice| notice.url == "http://media.test/abc_720.mp4")
            .times(1)
            .returning(|_, _| Ok(()));

        let orchestrator = TranscodeOrchestrator::new(
            encoder.clone(),
            tracked_once(),
            callback,
            quiet_notifications(),
            config(dir.path()),
        );
        let report = orchestrator
            .transcode(request(&["720p", "480p"]))
            .await
            .unwrap();

        assert_eq!(report.status, 0);
        assert!(dir.path().join("abc_720.mp4").exists());
        assert!(!dir.path().join("abc_480.mp4").exists());
        assert!(report.job(Resolution::High).unwrap().status.is_success());
        assert!(matches!(
            report.job(Resolution::Medium).unwrap().status,
            JobStatus::Failed(_)
        ));
        // Only the succeeded variant is segmented.
        assert_eq!(encoder.segmented.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_resolution_rejects_before_any_job() {
        let dir = media_dir();
        let encoder = FakeEncoder::default();

        let orchestrator = TranscodeOrchestrator::new(
            encoder.clone(),
            MockActiveTranscodingStore::new(),
            MockArtifactCallback::new(),
            quiet_notifications(),
            config(dir.path()),
        );
        let err = orchestrator
            .transcode(request(&["720p", "1080p"]))
            .await
            .unwrap_err();

        assert!(matches!(err, TranscodeError::Validation(_)));
        assert!(encoder.encoded.lock().unwrap().is_empty());
        assert!(!dir.path().join("abc_720.mp4").exists());
    }

    #[tokio::test]
    async fn missing_or_escaping_source_is_rejected() {
        let dir = media_dir();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("other.mp4"), b"x").unwrap();

        let orchestrator = TranscodeOrchestrator::new(
            FakeEncoder::default(),
            MockActiveTranscodingStore::new(),
            MockArtifactCallback::new(),
            quiet_notifications(),
            config(dir.path()),
        );

        let mut missing = request(&["720p"]);
        missing.source = PathBuf::from("nope.mp4");
        assert!(orchestrator.transcode(missing).await.is_err());

        let mut escaping = request(&["720p"]);
        escaping.source = outside.path().join("other.mp4");
        assert!(orchestrator.transcode(escaping).await.is_err());

        assert!(orchestrator.transcode(request(&[])).await.is_err());
    }

    #[tokio::test]
    async fn missing_identity_is_rejected() {
        let dir = media_dir();
        let encoder = FakeEncoder::default();
        let orchestrator = TranscodeOrchestrator::new(
            encoder.clone(),
            MockActiveTranscodingStore::new(),
            MockArtifactCallback::new(),
            quiet_notifications(),
            config(dir.path()),
        );

        let mut anonymous = request(&["720p"]);
        anonymous.identity = "  ".into();
        assert!(matches!(
            orchestrator.transcode(anonymous).await,
            Err(TranscodeError::Validation(_))
        ));
        assert!(encoder.encoded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_runs_keep_separate_records() {
        let dir = media_dir();
        std::fs::write(dir.path().join("fast.mp4"), b"source").unwrap();
        let tracking = MemoryTracking::default();
        let records = tracking.records.clone();
        let mut callback = MockArtifactCallback::new();
        callback.expect_notify().returning(|_, _| Ok(()));

        let orchestrator = TranscodeOrchestrator::new(
            FakeEncoder {
                slow: vec![Resolution::Low],
                ..Default::default()
            },
            tracking,
            callback,
            quiet_notifications(),
            config(dir.path()),
        );

        let slow_run = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.transcode(request(&["360p"])).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while records.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let mut fast = request(&["720p"]);
        fast.source = PathBuf::from("fast.mp4");
        assert_eq!(orchestrator.transcode(fast).await.unwrap().status, 1);

        // The finished run cleared only its own record.
        let live: Vec<Vec<String>> = records.lock().unwrap().values().cloned().collect();
        assert_eq!(
            live,
            vec![vec!["transcoding-abc-quality-640x360".to_string()]]
        );

        assert_eq!(slow_run.await.unwrap().unwrap().status, 1);
        assert!(records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tracking_failures_are_not_fatal() {
        let dir = media_dir();
        let mut tracking = MockActiveTranscodingStore::new();
        tracking
            .expect_set_active()
            .returning(|_| Err("redis down".into()));
        tracking
            .expect_remove_active()
            .times(1)
            .returning(|_| Err("redis down".into()));
        let mut callback = MockArtifactCallback::new();
        callback
            .expect_notify()
            .returning(|_, _| Err("callback down".into()));

        let orchestrator = TranscodeOrchestrator::new(
            FakeEncoder::default(),
            tracking,
            callback,
            quiet_notifications(),
            config(dir.path()),
        );
        let report = orchestrator.transcode(request(&["360p"])).await.unwrap();
        assert_eq!(report.status, 1);
    }

    #[tokio::test]
    async fn hung_job_times_out_and_the_run_completes() {
        let dir = media_dir();
        let encoder = FakeEncoder {
            hang: vec![Resolution::Low],
            ..Default::default()
        };
        let mut callback = MockArtifactCallback::new();
        callback.expect_notify().times(1).returning(|_, _| Ok(()));

        let mut config = config(dir.path());
        config.job_timeout = Some(Duration::from_millis(100));
        let orchestrator = TranscodeOrchestrator::new(
            encoder,
            tracked_once(),
            callback,
            quiet_notifications(),
            config,
        );

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.transcode(request(&["720p", "360p"])),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.status, 0);
        assert_eq!(
            report.job(Resolution::Low).unwrap().status,
            JobStatus::TimedOut
        );
        assert!(report.job(Resolution::High).unwrap().status.is_success());
    }

    #[tokio::test]
    async fn cancelling_the_run_cancels_pending_jobs() {
        let dir = media_dir();
        let encoder = FakeEncoder {
            hang: vec![Resolution::High],
            ..Default::default()
        };
        let orchestrator = TranscodeOrchestrator::new(
            encoder,
            tracked_once(),
            MockArtifactCallback::new(),
            quiet_notifications(),
            config(dir.path()),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = orchestrator
            .transcode_with_cancel(request(&["720p"]), cancel)
            .await
            .unwrap();
        assert_eq!(
            report.job(Resolution::High).unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn progress_is_published_per_channel() {
        let dir = media_dir();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut notifier = MockProgressNotifier::new();
        notifier.expect_publish().returning(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        let (queue, drain) = NotificationQueue::start(notifier, 64);

        let mut callback = MockArtifactCallback::new();
        callback.expect_notify().returning(|_, _| Ok(()));
        let orchestrator = TranscodeOrchestrator::new(
            FakeEncoder::default(),
            tracked_once(),
            callback,
            queue,
            config(dir.path()),
        );
        orchestrator.transcode(request(&["360p"])).await.unwrap();
        drop(orchestrator);
        drain.await.unwrap();

        let seen = seen.lock().unwrap();
        let progress: Vec<&str> = seen.iter().map(|event| event.progress.as_str()).collect();
        assert_eq!(progress, vec!["0.50", "1.00"]);
        assert!(seen
            .iter()
            .all(|event| event.channel == "transcoding-abc-quality-640x360"));
    }

    #[tokio::test]
    async fn playlist_prefers_existing_variant() {
        let dir = media_dir();
        std::fs::write(dir.path().join("abc_480.mp4"), b"variant").unwrap();
        let encoder = FakeEncoder::default();
        let orchestrator = TranscodeOrchestrator::new(
            encoder.clone(),
            MockActiveTranscodingStore::new(),
            MockArtifactCallback::new(),
            quiet_notifications(),
            config(dir.path()),
        );

        let report = orchestrator
            .write_playlist(PlaylistRequest {
                source: PathBuf::from("abc.mp4"),
                resolution: default_playlist_resolution(),
            })
            .await
            .unwrap();

        assert_eq!(report.url, "http://media.test/abc/480.m3u8");
        assert_eq!(report.segments, 1);
        let playlist = std::fs::read_to_string(dir.path().join("abc/480.m3u8")).unwrap();
        assert!(playlist.contains("480_000.ts"));
        let segmented = encoder.segmented.lock().unwrap();
        assert!(segmented[0].ends_with("abc_480.mp4"));
        // No encode and no tracking record for a playlist-only request.
        assert!(encoder.encoded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn playlist_falls_back_to_source() {
        let dir = media_dir();
        let encoder = FakeEncoder::default();
        let orchestrator = TranscodeOrchestrator::new(
            encoder.clone(),
            MockActiveTranscodingStore::new(),
            MockArtifactCallback::new(),
            quiet_notifications(),
            config(dir.path()),
        );

        orchestrator
            .write_playlist(PlaylistRequest {
                source: PathBuf::from("abc.mp4"),
                resolution: "720p".into(),
            })
            .await
            .unwrap();

        assert!(dir.path().join("abc/720.m3u8").exists());
        assert!(encoder.segmented.lock().unwrap()[0].ends_with("abc.mp4"));

        let unknown = orchestrator
            .write_playlist(PlaylistRequest {
                source: PathBuf::from("abc.mp4"),
                resolution: "4k".into(),
            })
            .await;
        assert!(matches!(unknown, Err(TranscodeError::Validation(_))));
    }

    #[test]
    fn public_url_joins_relative_path() {
        assert_eq!(
            public_url(
                "http://host/",
                Path::new("/srv/media"),
                Path::new("/srv/media/abc/abc_480.mp4")
            ),
            "http://host/abc/abc_480.mp4"
        );
    }
}
