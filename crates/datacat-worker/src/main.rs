//! datacat worker process.
//!
//! Runs the job dispatcher and the retention sweeper against Redis and
//! PostgreSQL until interrupted.

mod config;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use datacat_core::{defaults, logging, JobStore};
use datacat_db::{log_pool_metrics, Database, RedisJobStore};
use datacat_jobs::{
    DatasetProcessor, DispatcherBuilder, DispatcherEvent, JobQueue, ProcessDatasetHandler,
    ProcessDatasetUrlHandler, RetentionSweeper,
};
use datacat_profile::Profiler;

use crate::config::{redact_url, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "datacat_worker=debug,datacat_jobs=debug,datacat_db=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
    }

    info!(log_format = %log_format, "Logging initialized");

    let settings = Settings::from_env();

    // Connect to database
    info!(
        subsystem = logging::SUBSYSTEM_WORKER,
        database_url = %redact_url(&settings.database_url),
        "Connecting to database..."
    );
    let db = connect_with_retry("PostgreSQL", || {
        Database::connect_with_config(&settings.database_url, settings.pool.clone())
    })
    .await?;
    log_pool_metrics(&db.pool);

    info!(subsystem = logging::SUBSYSTEM_WORKER, "Running database migrations...");
    db.migrate().await.context("Failed to run migrations")?;
    info!(subsystem = logging::SUBSYSTEM_WORKER, "Database migrations complete");

    // Connect to job store
    info!(
        subsystem = logging::SUBSYSTEM_WORKER,
        redis_url = %redact_url(&settings.redis_url),
        "Connecting to job store..."
    );
    let store: Arc<dyn JobStore> =
        Arc::new(connect_with_retry("Redis", || RedisJobStore::connect(&settings.redis_url)).await?);
    let queue = JobQueue::new(store.clone());

    // Handlers
    let processor = DatasetProcessor::new(Arc::new(db.catalog.clone()))
        .with_profiler(Profiler::new().with_sample_size(settings.sample_size));
    let client = reqwest::Client::builder()
        .timeout(settings.download_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let mut url_handler = ProcessDatasetUrlHandler::new(processor.clone(), client)
        .with_default_schema(&settings.default_schema);
    if let Some(dir) = &settings.download_dir {
        url_handler = url_handler.with_download_dir(dir);
    }

    let dispatcher = DispatcherBuilder::new(queue.clone())
        .with_config(settings.dispatcher.clone())
        .with_handler(
            ProcessDatasetHandler::new(processor).with_default_schema(&settings.default_schema),
        )
        .with_handler(url_handler)
        .build()
        .await;

    let job_types = dispatcher.registry().job_types().await;
    match queue.queue_stats().await {
        Ok(stats) => info!(
            subsystem = logging::SUBSYSTEM_WORKER,
            handlers = ?job_types,
            queue_length = stats.queue_length,
            total_jobs = stats.total_jobs,
            "Starting dispatcher..."
        ),
        Err(e) => warn!(
            subsystem = logging::SUBSYSTEM_WORKER,
            error = %e,
            "Could not read queue stats at startup"
        ),
    }

    let handle = dispatcher.start();
    tokio::spawn(log_events(handle.events()));

    let sweeper = RetentionSweeper::new(store, settings.sweeper.clone()).start();
    info!(
        subsystem = logging::SUBSYSTEM_WORKER,
        interval_secs = settings.sweeper.interval_secs,
        max_age_hours = settings.sweeper.max_age_hours,
        "Retention sweeper started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!(subsystem = logging::SUBSYSTEM_WORKER, "Shutdown signal received");

    handle.shutdown().await?;
    sweeper.shutdown().await?;
    db.pool.close().await;

    info!(subsystem = logging::SUBSYSTEM_WORKER, "Worker stopped");
    Ok(())
}

/// Retry `connect` with doubling delays up to the configured attempt count.
async fn connect_with_retry<T, F, Fut>(what: &str, mut connect: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = datacat_core::Result<T>>,
{
    let mut delay = Duration::from_secs(1);
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(conn) => {
                info!(subsystem = logging::SUBSYSTEM_WORKER, store = what, attempt, "Connected");
                return Ok(conn);
            }
            Err(e) if attempt < defaults::STORE_CONNECT_ATTEMPTS => {
                warn!(
                    subsystem = logging::SUBSYSTEM_WORKER,
                    store = what,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to connect to {} after {} attempts", what, attempt)));
            }
        }
    }
}

/// Log a running tally of finished jobs.
async fn log_events(mut events: broadcast::Receiver<DispatcherEvent>) {
    let (mut completed, mut failed) = (0u64, 0u64);
    loop {
        match events.recv().await {
            Ok(DispatcherEvent::JobCompleted { .. }) => completed += 1,
            Ok(DispatcherEvent::JobFailed { .. }) => failed += 1,
            Ok(DispatcherEvent::DispatcherStopped) | Err(broadcast::error::RecvError::Closed) => {
                break
            }
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    subsystem = logging::SUBSYSTEM_WORKER,
                    skipped, "Event listener lagged"
                );
                continue;
            }
        }
        debug!(
            subsystem = logging::SUBSYSTEM_WORKER,
            completed, failed, "Job tally"
        );
    }
    info!(
        subsystem = logging::SUBSYSTEM_WORKER,
        completed, failed, "Dispatcher event stream closed"
    );
}
