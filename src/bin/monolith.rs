//! Monolith Binary - Local deployment
//!
//! It wires up:
//! - Local adapters (ffmpeg, Redis, HTTP callback, event hub)
//! - Application services (assembler, transcoder, thumbnails, content)
//! - Background tasks (notification drain, staging sweeper)
//! - HTTP inbound adapter

use mediaplex::adapters::local::events::{EventHub, FanoutNotifier, WebhookNotifier};
use mediaplex::adapters::local::http::{router, AppState, HttpSettings};
use mediaplex::adapters::local::{FfmpegEncoder, HttpCallback, HttpDownloader, RedisPool};
use mediaplex::application::assembler::{AssemblerConfig, ChunkAssembler};
use mediaplex::application::content::ContentServer;
use mediaplex::application::notify::NotificationQueue;
use mediaplex::application::thumbnail::ThumbnailService;
use mediaplex::application::transcoder::{OrchestratorConfig, TranscodeOrchestrator};
use mediaplex::config::LocalConfig;
use mediaplex::domain::cache::WeightedCache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = LocalConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let media_root = PathBuf::from(&config.media_root);
    let staging_root = PathBuf::from(&config.staging_dir);
    for dir in [&media_root, &staging_root] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!(path = %dir.display(), error = %e, "failed to create directory");
            std::process::exit(1);
        }
    }

    // 1. Adapters (Local implementations)
    let redis = match RedisPool::new(&config.redis_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to create Redis pool");
            std::process::exit(1);
        }
    };
    let http_client = reqwest::Client::new();
    let encoder = FfmpegEncoder::default();
    let hub = EventHub::default();

    // 2. Progress notifications
    let mut notifier = FanoutNotifier::new().with(hub.clone());
    if let Some(url) = &config.notify_webhook_url {
        notifier = notifier.with(WebhookNotifier::new(http_client.clone(), url.clone()));
    }
    let (notifications, _drain) = NotificationQueue::start(notifier, config.notify_queue_capacity);

    // 3. Application Services
    let assembler = ChunkAssembler::new(AssemblerConfig {
        staging_root: staging_root.clone(),
        media_root: media_root.clone(),
    });
    let transcoder = TranscodeOrchestrator::new(
        encoder.clone(),
        redis.clone(),
        HttpCallback::new(http_client.clone(), config.callback_url.clone()),
        notifications,
        OrchestratorConfig {
            media_root: media_root.clone(),
            public_base_url: config.public_base_url.clone(),
            bitrate: config.video_bitrate.clone(),
            segment_seconds: config.segment_seconds,
            scrub_interval_secs: config.scrub_interval_secs,
            job_timeout: config.job_timeout_secs.map(Duration::from_secs),
        },
    );
    let cache = Arc::new(WeightedCache::new(config.cache_capacity, config.cache_budget_mb));

    // 4. Stale staging sweeper
    let sweeper = assembler.clone();
    let max_age = Duration::from_secs(config.staging_max_age_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs.max(1)));
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            match sweeper.sweep_stale(max_age).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "staging sweep finished"),
                Err(e) => warn!(error = %e, "staging sweep failed"),
            }
        }
    });

    // 5. HTTP Layer
    let state = AppState {
        assembler,
        transcoder,
        thumbnails: ThumbnailService::new(Arc::new(encoder)),
        content: ContentServer::new(cache, media_root.clone()),
        downloader: HttpDownloader::new(http_client, media_root.clone()),
        hub,
        identities: Arc::new(redis.clone()),
        publisher: Arc::new(redis),
        settings: Arc::new(HttpSettings {
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            public_base_url: config.public_base_url.clone(),
            media_root,
            scratch_dir: staging_root,
        }),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = router(state).layer(cors);

    // 6. Start Server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
