//! comment_analytics - social comment analytics pipeline
//!
//! Runs the extractor, scorer and aggregator stages over Postgres-backed
//! queues, the snapshot scheduler and the read-only analytics API.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comment_analytics::aggregation::{AggregateHandler, Aggregator};
use comment_analytics::api::{self, AppState};
use comment_analytics::db;
use comment_analytics::dedup::{LedgerScope, PgDedupLedger};
use comment_analytics::extractor::{Extractor, ExtractorConfig};
use comment_analytics::jobs::{JobScheduler, JobSchedulerConfig};
use comment_analytics::queue::{PgQueue, QueueWorker, WorkerConfig, INTAKE_QUEUE, RESULT_QUEUE};
use comment_analytics::scoring::{FallbackNlp, HttpNlpClient, ScoreHandler, Scorer};
use comment_analytics::snapshot::{SnapshotTrigger, Snapshotter};
use comment_analytics::source::{GraphFeed, GraphFeedConfig};
use comment_analytics::store::PgStore;
use comment_analytics::Config;

/// Pending snapshot requests kept before new ones are dropped
const SNAPSHOT_REQUEST_CAPACITY: usize = 16;

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "comment_analytics=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting comment_analytics");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");

    let store = Arc::new(PgStore::new(pool.clone()));
    let intake = Arc::new(PgQueue::new(
        pool.clone(),
        INTAKE_QUEUE,
        config.queue.visibility_timeout,
    ));
    let results = Arc::new(PgQueue::new(
        pool.clone(),
        RESULT_QUEUE,
        config.queue.visibility_timeout,
    ));

    let worker_config = WorkerConfig {
        batch_size: config.queue.batch_size,
        poll_interval: config.queue.poll_interval,
        // Leave headroom so a batch finishes before its messages become visible again
        deadline: config.queue.visibility_timeout / 2,
    };

    // Scorer stage
    let scorer = match &config.nlp_endpoint {
        Some(endpoint) => Scorer::with_nlp(Arc::new(HttpNlpClient::new(endpoint.as_str()))),
        None => {
            tracing::warn!("NLP_ENDPOINT not set, language and sentiment use fallback defaults");
            Scorer::with_nlp(Arc::new(FallbackNlp))
        }
    };
    let score_worker = QueueWorker::with_config(
        intake.clone(),
        Arc::new(ScoreHandler::new(scorer, results.clone())),
        worker_config.clone(),
    )
    .start();

    // Aggregator stage
    let aggregate_worker = QueueWorker::with_config(
        results.clone(),
        Arc::new(AggregateHandler::new(
            Aggregator::new(store.clone()),
            Arc::new(PgDedupLedger::new(pool.clone(), LedgerScope::Aggregated)),
        )),
        worker_config,
    )
    .start();

    // Extractor and snapshots
    if !config.source_configured() {
        tracing::warn!("SOURCE_ACCESS_TOKEN or SOURCE_PAGE_ID not set, extraction cycles will fail");
    }
    let (trigger, requests) =
        SnapshotTrigger::channel(config.snapshot_trigger_delay, SNAPSHOT_REQUEST_CAPACITY);

    let extractor = Extractor::new(
        Arc::new(GraphFeed::new(GraphFeedConfig {
            api_base: config.source.api_base.clone(),
            page_id: config.source.page_id.clone(),
            access_token: config.source.access_token.clone(),
            comment_limit: config.source.comment_limit,
        })),
        Arc::new(PgDedupLedger::new(pool.clone(), LedgerScope::Extracted)),
        store.clone(),
        intake.clone(),
        ExtractorConfig {
            page_limit: config.source.page_limit,
            page_id: config.source.page_id.clone(),
            ..Default::default()
        },
    )
    .with_trigger(trigger);

    let scheduler = JobScheduler::with_config(
        extractor,
        Snapshotter::new(store.clone(), store.clone()),
        JobSchedulerConfig {
            extract_interval: config.extract_interval,
            snapshot_interval: config.snapshot_interval,
        },
    )
    .with_requests(requests)
    .start();

    // Read API
    let app = api::build_router(AppState::from_store(store));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    scheduler.abort();
    score_worker.abort();
    aggregate_worker.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
