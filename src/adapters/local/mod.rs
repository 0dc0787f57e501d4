//! Local adapters for monolith deployment.

pub mod callback;
pub mod download;
pub mod events;
pub mod ffmpeg;
pub mod http;
pub mod redis;

pub use callback::HttpCallback;
pub use download::HttpDownloader;
pub use events::EventHub;
pub use ffmpeg::FfmpegEncoder;
pub use redis::RedisPool;

use crate::application::transcoder::TranscodeOrchestrator;

/// Orchestrator wired to the local adapters.
pub type LocalTranscoder = TranscodeOrchestrator<FfmpegEncoder, RedisPool, HttpCallback>;
