//! HTTP inbound adapter.
//!
//! Thin axum glue over the application services: chunked upload, remote
//! download, transcode, playlist writing, thumbnail extraction, progress
//! subscription and content retrieval.

mod content;
mod error;
mod events;
mod media;
mod range;
mod upload;

pub use content::cache_control;
pub use error::ApiError;
pub use range::{parse_range, ByteRange};

use super::callback::API_KEY_HEADER;
use super::download::HttpDownloader;
use super::events::EventHub;
use super::ffmpeg::FfmpegEncoder;
use super::LocalTranscoder;
use crate::application::assembler::ChunkAssembler;
use crate::application::content::ContentServer;
use crate::application::thumbnail::ThumbnailService;
use crate::ports::uploads::{IdentityResolver, UploadPublisher};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Request-level settings shared by the handlers.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub upload_timeout: Duration,
    pub public_base_url: String,
    pub media_root: PathBuf,
    /// Where raw thumbnail uploads are written before extraction.
    pub scratch_dir: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub assembler: ChunkAssembler,
    pub transcoder: LocalTranscoder,
    pub thumbnails: ThumbnailService<FfmpegEncoder>,
    pub content: ContentServer,
    pub downloader: HttpDownloader,
    pub hub: EventHub,
    pub identities: Arc<dyn IdentityResolver>,
    pub publisher: Arc<dyn UploadPublisher>,
    pub settings: Arc<HttpSettings>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload::upload_fragment))
        .route("/download-transcode", post(media::download))
        .route("/transcode", post(media::transcode))
        .route("/m3u8", post(media::playlist))
        .route("/thumbnail", post(media::thumbnail))
        .route("/events", get(events::subscribe))
        .route("/*path", get(content::serve))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
