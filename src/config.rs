//! Configuration for the local deployment.

#[cfg(feature = "local")]
use std::env;
#[cfg(feature = "local")]
use std::str::FromStr;

/// Configuration for local/monolith deployment.
#[cfg(feature = "local")]
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Redis connection URL
    pub redis_url: String,
    /// Assembled uploads, variants and derivatives
    pub media_root: String,
    /// Per-upload staging directories
    pub staging_dir: String,
    /// Prefix for artifact URLs handed to callers
    pub public_base_url: String,
    /// Completion callback endpoint
    pub callback_url: String,
    /// Optional webhook receiving every progress event
    pub notify_webhook_url: Option<String>,
    pub cache_budget_mb: u64,
    pub cache_capacity: usize,
    pub upload_timeout_secs: u64,
    pub staging_max_age_secs: u64,
    pub sweep_interval_secs: u64,
    /// Per-job encode deadline; unset means none
    pub job_timeout_secs: Option<u64>,
    pub notify_queue_capacity: usize,
    pub video_bitrate: String,
    pub segment_seconds: u32,
    pub scrub_interval_secs: u32,
}

#[cfg(feature = "local")]
impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            addr: string("ADDR", "127.0.0.1"),
            port: string("PORT", "3002"),
            redis_url: string("REDIS_URL", "redis://127.0.0.1/"),
            media_root: string("MEDIA_ROOT", "./media"),
            staging_dir: string("STAGING_DIR", "./staging"),
            public_base_url: string("PUBLIC_BASE_URL", "http://localhost:3002"),
            callback_url: string(
                "CALLBACK_URL",
                "http://localhost:3000/api/applications/uploads/callback",
            ),
            notify_webhook_url: optional("NOTIFY_WEBHOOK_URL"),
            cache_budget_mb: parsed(&lookup, "CACHE_BUDGET_MB", 150),
            cache_capacity: parsed(&lookup, "CACHE_CAPACITY", 100),
            upload_timeout_secs: parsed(&lookup, "UPLOAD_TIMEOUT_SECS", 30),
            staging_max_age_secs: parsed(&lookup, "STAGING_MAX_AGE_SECS", 3600),
            sweep_interval_secs: parsed(&lookup, "SWEEP_INTERVAL_SECS", 300),
            job_timeout_secs: optional("JOB_TIMEOUT_SECS").and_then(|value| value.trim().parse().ok()),
            notify_queue_capacity: parsed(&lookup, "NOTIFY_QUEUE_CAPACITY", 256),
            video_bitrate: string("VIDEO_BITRATE", "1000k"),
            segment_seconds: parsed(&lookup, "SEGMENT_SECONDS", 10),
            scrub_interval_secs: parsed(&lookup, "SCRUB_INTERVAL_SECS", 10),
        }
    }
}

#[cfg(feature = "local")]
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
