//! Chunked upload reassembly.
//!
//! Each fragment is written straight to `{staging_root}/{upload_id}/` together
//! with a JSON sidecar carrying its sequence index. Once every index in
//! `0..total_chunks` is present the fragments are concatenated in index order
//! into `{media_root}/{upload_id}.{ext}` and the declared size is verified.

use crate::domain::upload::{
    assembled_name, fragment_names, is_safe_segment, order_fragments, AssembledFile,
    FragmentRecord, UploadSession,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("invalid upload request: {0}")]
    Validation(String),
    #[error("size mismatch: wrote {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("missing fragments {0:?}")]
    MissingFragments(Vec<u32>),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("upload timed out after {0:?}")]
    TimedOut(Duration),
    #[error("upload task failed: {0}")]
    Internal(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AssemblyError + '_ {
    move |source| AssemblyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One received fragment of an upload.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub upload_id: String,
    /// Zero-based sequence index.
    pub index: u32,
    pub total_chunks: u32,
    /// Base file name supplied by the client.
    pub file_name: String,
    pub extension: String,
    /// Declared size of the whole upload.
    pub total_size: u64,
    pub data: Bytes,
}

impl Fragment {
    fn validate(&self) -> Result<(), AssemblyError> {
        if !is_safe_segment(&self.upload_id) {
            return Err(AssemblyError::Validation(format!(
                "invalid upload id {:?}",
                self.upload_id
            )));
        }
        if self.extension.is_empty() || !self.extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AssemblyError::Validation(format!(
                "invalid extension {:?}",
                self.extension
            )));
        }
        if self.total_chunks == 0 {
            return Err(AssemblyError::Validation("totalChunks must be positive".into()));
        }
        if self.index >= self.total_chunks {
            return Err(AssemblyError::Validation(format!(
                "chunk {} out of range for {} chunks",
                self.index, self.total_chunks
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentStatus {
    /// More fragments expected.
    Partial {
        received: u32,
        total: u32,
        percent: u8,
    },
    /// This fragment completed the upload.
    Complete(AssembledFile),
    /// The upload had already been assembled; the fragment was ignored.
    AlreadyComplete,
}

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub staging_root: PathBuf,
    pub media_root: PathBuf,
}

#[derive(Clone)]
pub struct ChunkAssembler {
    config: Arc<AssemblerConfig>,
    sessions: Arc<Mutex<HashMap<String, Arc<Mutex<UploadSession>>>>>,
}

impl ChunkAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.config.staging_root.join(upload_id)
    }

    pub fn output_path(&self, upload_id: &str, extension: &str) -> PathBuf {
        self.config
            .media_root
            .join(assembled_name(upload_id, extension))
    }

    /// Receives a fragment under a deadline. The work runs on its own task and
    /// is left running if the deadline passes, so a late completion still
    /// produces the assembled file.
    pub async fn receive_within(
        &self,
        fragment: Fragment,
        limit: Duration,
    ) -> Result<FragmentStatus, AssemblyError> {
        let this = self.clone();
        let upload_id = fragment.upload_id.clone();
        let task = tokio::spawn(async move { this.receive(fragment).await });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!(upload_id, error = %join_error, "upload task failed");
                Err(AssemblyError::Internal(join_error.to_string()))
            }
            Err(_) => {
                warn!(upload_id, ?limit, "upload timed out");
                Err(AssemblyError::TimedOut(limit))
            }
        }
    }

    /// Persists one fragment and assembles the upload once it is complete.
    pub async fn receive(&self, fragment: Fragment) -> Result<FragmentStatus, AssemblyError> {
        fragment.validate()?;

        let output = self.output_path(&fragment.upload_id, &fragment.extension);
        let Some(session) = self.session_for(&fragment, &output).await? else {
            info!(upload_id = %fragment.upload_id, index = fragment.index, "fragment after completion ignored");
            return Ok(FragmentStatus::AlreadyComplete);
        };

        let mut session = session.lock().await;
        if session.finished {
            return Ok(FragmentStatus::AlreadyComplete);
        }
        if session.total_chunks != fragment.total_chunks || session.total_size != fragment.total_size {
            return Err(AssemblyError::Validation(format!(
                "fragment declares {} chunks / {} bytes but upload {} expects {} / {}",
                fragment.total_chunks,
                fragment.total_size,
                session.upload_id,
                session.total_chunks,
                session.total_size
            )));
        }

        let record = write_fragment(&session.staging_dir, &fragment).await?;
        session.record(record.index, record.size);
        debug!(
            upload_id = %session.upload_id,
            index = record.index,
            size = record.size,
            "fragment staged"
        );

        if !session.is_complete() {
            if fragment.index + 1 == fragment.total_chunks {
                warn!(
                    upload_id = %session.upload_id,
                    missing = ?session.missing(),
                    "final fragment arrived before earlier ones"
                );
            }
            return Ok(FragmentStatus::Partial {
                received: session.received.len() as u32,
                total: session.total_chunks,
                percent: session.progress_percent(),
            });
        }

        session.finished = true;
        let result = self.assemble(&session, &output).await;
        self.sessions.lock().await.remove(&session.upload_id);
        result.map(FragmentStatus::Complete)
    }

    async fn session_for(
        &self,
        fragment: &Fragment,
        output: &Path,
    ) -> Result<Option<Arc<Mutex<UploadSession>>>, AssemblyError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&fragment.upload_id) {
            return Ok(Some(session.clone()));
        }

        let staging_dir = self.staging_dir(&fragment.upload_id);
        if fs::try_exists(output).await.unwrap_or(false)
            && !fs::try_exists(&staging_dir).await.unwrap_or(false)
        {
            return Ok(None);
        }

        fs::create_dir_all(&staging_dir)
            .await
            .map_err(io_err(&staging_dir))?;

        let mut session = UploadSession::new(
            fragment.upload_id.clone(),
            fragment.total_chunks,
            fragment.total_size,
            fragment.file_name.clone(),
            fragment.extension.clone(),
            staging_dir.clone(),
        );
        // Fragments staged before a restart are still valid.
        for record in read_records(&staging_dir).await? {
            session.record(record.index, record.size);
        }
        info!(upload_id = %fragment.upload_id, restored = session.received.len(), "upload session opened");

        let session = Arc::new(Mutex::new(session));
        sessions.insert(fragment.upload_id.clone(), session.clone());
        Ok(Some(session))
    }

    async fn assemble(
        &self,
        session: &UploadSession,
        output: &Path,
    ) -> Result<AssembledFile, AssemblyError> {
        match self.concatenate(session, output).await {
            Ok(size) if size == session.total_size => {
                purge_dir(&session.staging_dir).await;
                info!(upload_id = %session.upload_id, size, path = %output.display(), "upload assembled");
                Ok(AssembledFile {
                    upload_id: session.upload_id.clone(),
                    path: output.to_path_buf(),
                    size,
                    extension: session.extension.clone(),
                    file_name: session.file_name.clone(),
                })
            }
            Ok(size) => {
                warn!(
                    upload_id = %session.upload_id,
                    written = size,
                    expected = session.total_size,
                    "size mismatch, discarding upload"
                );
                purge_file(output).await;
                purge_dir(&session.staging_dir).await;
                Err(AssemblyError::SizeMismatch {
                    expected: session.total_size,
                    actual: size,
                })
            }
            Err(e) => {
                error!(upload_id = %session.upload_id, error = %e, "assembly failed");
                purge_file(output).await;
                purge_dir(&session.staging_dir).await;
                Err(e)
            }
        }
    }

    /// Writes every fragment in index order; returns the bytes written.
    async fn concatenate(&self, session: &UploadSession, output: &Path) -> Result<u64, AssemblyError> {
        let records = read_records(&session.staging_dir).await?;
        let ordered = order_fragments(records, session.total_chunks)
            .map_err(AssemblyError::MissingFragments)?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }
        let file = File::create(output).await.map_err(io_err(output))?;
        let mut writer = BufWriter::new(file);

        let mut written = 0u64;
        for record in &ordered {
            let path = session.staging_dir.join(&record.file);
            let mut part = File::open(&path).await.map_err(io_err(&path))?;
            written += tokio::io::copy(&mut part, &mut writer)
                .await
                .map_err(io_err(&path))?;
        }
        writer.flush().await.map_err(io_err(output))?;
        Ok(written)
    }

    /// Removes staging directories untouched for longer than `max_age` and
    /// forgets their sessions. Returns how many were removed.
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<usize, AssemblyError> {
        let root = &self.config.staging_root;
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_err(root)(e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_err(root))? {
            let path = entry.path();
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(now);
            let idle = now.duration_since(modified).unwrap_or_default();
            if idle < max_age {
                continue;
            }

            let upload_id = entry.file_name().to_string_lossy().into_owned();
            self.sessions.lock().await.remove(&upload_id);
            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!(upload_id, ?idle, "swept stale staging directory");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to sweep staging directory"),
            }
        }
        Ok(removed)
    }
}

async fn write_fragment(staging_dir: &Path, fragment: &Fragment) -> Result<FragmentRecord, AssemblyError> {
    let (data_name, record_name) = fragment_names(fragment.index);

    let data_path = staging_dir.join(&data_name);
    fs::write(&data_path, &fragment.data)
        .await
        .map_err(io_err(&data_path))?;

    let record = FragmentRecord {
        index: fragment.index,
        size: fragment.data.len() as u64,
        file: data_name,
    };
    let json = serde_json::to_vec(&record).map_err(|e| AssemblyError::Internal(e.to_string()))?;

    // The sidecar appears atomically, only after the payload is on disk.
    let record_path = staging_dir.join(&record_name);
    let tmp_path = staging_dir.join(format!("{}.tmp", record_name));
    fs::write(&tmp_path, json).await.map_err(io_err(&tmp_path))?;
    fs::rename(&tmp_path, &record_path)
        .await
        .map_err(io_err(&record_path))?;
    Ok(record)
}

async fn read_records(staging_dir: &Path) -> Result<Vec<FragmentRecord>, AssemblyError> {
    let mut records = Vec::new();
    let mut entries = fs::read_dir(staging_dir).await.map_err(io_err(staging_dir))?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err(staging_dir))? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let raw = fs::read(&path).await.map_err(io_err(&path))?;
        match serde_json::from_slice::<FragmentRecord>(&raw) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable fragment record"),
        }
    }
    Ok(records)
}

async fn purge_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove staging directory");
    }
}

async fn purge_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove output file");
        }
    }
}
