//! Mediaplex - Chunked media ingest, transcoding and cached delivery
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (cache, resolution, jobs, upload, hls)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Generic services
//! - config: Environment configuration
//!
//! # Features
//! - `local` (default): Local/monolith deployment (ffmpeg, Redis, HTTP API)

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
#[cfg(feature = "local")]
pub use adapters::local::{
    events, EventHub, FfmpegEncoder, HttpCallback, HttpDownloader, RedisPool,
};

#[cfg(feature = "local")]
pub use config::LocalConfig;

pub use domain::cache::WeightedCache;
