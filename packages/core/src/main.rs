// Main entry point for the archiving worker process

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use ollama_client::OllamaClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfmark_core::config::Config;
use shelfmark_core::domains::archive::{FailureLog, PdfStore};
use shelfmark_core::domains::convert::quality::QualityVerifier;
use shelfmark_core::domains::convert::ConvertHandler;
use shelfmark_core::domains::ingest::{FeedEndpoints, FeedSource, PollHandler, RouteHandler};
use shelfmark_core::domains::media::MediaHandler;
use shelfmark_core::domains::podcast::{PodcastHandler, Reformatter};
use shelfmark_core::kernel::asr::AsrClient;
use shelfmark_core::kernel::browser::{BrowserPool, CaptureConfig, Capturer, CookieStore};
use shelfmark_core::kernel::events::EventBus;
use shelfmark_core::kernel::jobs::{
    Queue, QueueOptions, Retention, SchedulerSpec, Worker, WorkerConfig,
};
use shelfmark_core::kernel::store::{RedisStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shelfmark_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting shelfmark archiving core");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to the durable store
    tracing::info!(url = %config.redis_url(), "Connecting to Redis...");
    let store: Arc<dyn Store> = Arc::new(
        RedisStore::connect(&config.redis_url())
            .await
            .context("Failed to connect to Redis")?,
    );
    tracing::info!("Redis connected");

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .context("Failed to create data directory")?;

    // Shared infrastructure
    let bus = EventBus::new();
    let browser_pool = Arc::new(BrowserPool::new());
    browser_pool
        .init()
        .await
        .context("Failed to launch headless browser")?;
    let cookies = Arc::new(CookieStore::new(&config.cookies_file));

    // Queues with their per-queue policies
    let feed_queue = Queue::new(
        "feed-poll",
        store.clone(),
        QueueOptions {
            attempts: 1,
            backoff_base: Duration::from_secs(30),
            remove_on_complete: Retention::count(20),
            remove_on_fail: Retention::count(50),
        },
    );
    let metadata_queue = Queue::new(
        "metadata",
        store.clone(),
        QueueOptions {
            attempts: 3,
            backoff_base: Duration::from_secs(10),
            remove_on_complete: Retention::count_and_age(200, Duration::from_secs(24 * 3600)),
            remove_on_fail: Retention::count(200),
        },
    );
    let convert_queue = Queue::new(
        "convert",
        store.clone(),
        QueueOptions {
            attempts: 3,
            backoff_base: Duration::from_secs(60),
            remove_on_complete: Retention::count_and_age(200, Duration::from_secs(7 * 24 * 3600)),
            remove_on_fail: Retention::KEEP_ALL,
        },
    );
    let media_queue = Queue::new(
        "media",
        store.clone(),
        QueueOptions {
            attempts: 5,
            backoff_base: Duration::from_secs(60),
            remove_on_complete: Retention::count(200),
            remove_on_fail: Retention::KEEP_ALL,
        },
    );
    let podcast_queue = Queue::new(
        "podcast",
        store.clone(),
        QueueOptions {
            attempts: 2,
            backoff_base: Duration::from_secs(120),
            remove_on_complete: Retention::count(50),
            remove_on_fail: Retention::KEEP_ALL,
        },
    );

    // Handlers
    let poll_handler = Arc::new(
        PollHandler::new(
            store.clone(),
            metadata_queue.clone(),
            FeedEndpoints {
                pocketfeed_url: config.pocketfeed_url.clone(),
                reader_api_url: config.reader_api_url.clone(),
            },
            bus.clone(),
        )
        .context("Failed to build feed poller")?,
    );
    let route_handler = Arc::new(
        RouteHandler::new(
            convert_queue.clone(),
            media_queue.clone(),
            podcast_queue.clone(),
        )
        .context("Failed to build router")?,
    );

    let ollama = OllamaClient::new(&config.vision_model_host);
    let capturer = Capturer::new(
        browser_pool.clone(),
        cookies.clone(),
        CaptureConfig {
            social_mirror_host: config.social_mirror_host.clone(),
            privacy_filter_terms: config.privacy_filter_terms.clone(),
        },
    );
    let verifier = QualityVerifier::new(
        ollama.clone(),
        &config.vision_model_name,
        config.quality_threshold,
    );
    let convert_handler = Arc::new(
        ConvertHandler::new(
            capturer,
            verifier,
            PdfStore::new(&config.data_dir),
            FailureLog::new(store.clone()),
            bus.clone(),
            config.debug_dir(),
        )
        .context("Failed to build conversion worker")?,
    );

    let shutdown = CancellationToken::new();
    let media_handler = Arc::new(
        MediaHandler::new(
            config.data_dir.clone(),
            config.reader_api_url.clone(),
            bus.clone(),
            shutdown.clone(),
        )
        .context("Failed to build media worker")?,
    );

    let podcast_handler = Arc::new(
        PodcastHandler::new(
            AsrClient::new(&config.asr_host).context("Failed to build ASR client")?,
            Reformatter::new(ollama.clone(), &config.text_model_name),
            config.data_dir.clone(),
            bus.clone(),
        )
        .context("Failed to build podcast worker")?,
    );

    // Recurring polls: feed poll on the epoch-aligned grid, plus a reader
    // catchup tick offset by half its interval to avoid overlapping the
    // main poll.
    let endpoints_configured = config.pocketfeed_url.is_some() || config.reader_api_url.is_some();
    if endpoints_configured {
        feed_queue
            .upsert_scheduler(
                "poll-feeds",
                SchedulerSpec {
                    every_ms: (config.feed_poll_interval_minutes * 60 * 1000) as i64,
                    start_at: None,
                    job_name: "poll-feeds".to_string(),
                    template: serde_json::json!({}),
                },
            )
            .await?;
    }
    if config.reader_api_url.is_some() {
        feed_queue
            .upsert_scheduler(
                "reader-catchup",
                SchedulerSpec {
                    every_ms: 5 * 60 * 1000,
                    start_at: Some(Utc.timestamp_millis_opt(150_000).unwrap()),
                    job_name: "poll-feeds".to_string(),
                    template: serde_json::json!({ "source": FeedSource::Reader }),
                },
            )
            .await?;
    }

    // Event subscriber: structured log of every pipeline event (the seam
    // external notifiers attach to).
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => {
                    tracing::info!(
                        event = %serde_json::to_string(&envelope.event).unwrap_or_default(),
                        "pipeline event"
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Workers
    let mut workers = Vec::new();
    workers.push(tokio::spawn(
        Worker::new(
            feed_queue.clone(),
            poll_handler,
            WorkerConfig::with_concurrency(1),
        )
        .run(shutdown.clone()),
    ));
    workers.push(tokio::spawn(
        Worker::new(
            metadata_queue.clone(),
            route_handler,
            WorkerConfig::with_concurrency(2),
        )
        .run(shutdown.clone()),
    ));
    workers.push(tokio::spawn(
        Worker::new(
            convert_queue.clone(),
            convert_handler,
            WorkerConfig::with_concurrency(1),
        )
        .run(shutdown.clone()),
    ));
    workers.push(tokio::spawn(
        Worker::new(
            media_queue.clone(),
            media_handler,
            WorkerConfig::with_concurrency(2),
        )
        .run(shutdown.clone()),
    ));
    workers.push(tokio::spawn(
        Worker::new(
            podcast_queue.clone(),
            podcast_handler,
            WorkerConfig::with_concurrency(1),
        )
        .run(shutdown.clone()),
    ));

    tracing::info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "All workers running"
    );

    wait_for_shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining workers");
    shutdown.cancel();

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "worker task panicked");
        }
    }

    // Browser goes last: no handler is mid-capture once workers drained.
    browser_pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
