//! Domain layer - Pure business logic.

pub mod cache;
pub mod hls;
pub mod jobs;
pub mod resolution;
pub mod upload;
