//! Redis adapter for local deployment.
//!
//! This module provides Redis-backed implementations of:
//! - `ActiveTranscodingStore` for the per-run live channel record
//! - `IdentityResolver` for API key lookup
//! - `UploadPublisher` for handing published uploads to the persistence side

mod error;
mod identity;
mod pool;
mod tracking;
mod uploads;

pub use error::StoreError;
pub use pool::RedisPool;

/// Redis key constants
const TRANSCODING_PREFIX: &str = "transcoding:";
const UPLOADS_LIST: &str = "mediaplex:uploads";

/// `transcoding:{identity}:{run_id}`; a caller's live runs share the
/// `transcoding:{identity}:` prefix.
pub(crate) fn tracking_key(identity: &str, run_id: &str) -> String {
    format!("{}{}:{}", TRANSCODING_PREFIX, identity, run_id)
}
