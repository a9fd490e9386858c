mod api;
mod config;
mod database;
mod error;
mod models;
mod repositories;
mod services;

use anyhow::{Context, Result};
use api::AppState;
use config::AppConfig;
use database::Database;
use repositories::RepositoryRepository;
use services::crawler::supervisor::CrawlerSupervisor;
use services::encryption::EncryptionService;
use services::progress::ProgressTracker;
use services::scheduler::SchedulerService;
use services::search::{IndexManager, StaticFacetCache};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit codes per the external interface contract: 0 normal, 2 config
/// error, 3 data directory unreadable, 4 index corruption detected.
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_DATA_DIR_ERROR: i32 = 3;
const EXIT_INDEX_ERROR: i32 = 4;

fn main() {
    let config = match AppConfig::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| config.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = std::fs::create_dir_all(&config.search.data_dir) {
        error!("data directory {} is not usable: {}", config.search.data_dir, e);
        std::process::exit(EXIT_DATA_DIR_ERROR);
    }

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    if let Err(e) = runtime.block_on(run(config)) {
        error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    info!("starting codescout on {}", bind_address);

    let database = Database::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;
    info!("database connected");

    let repository_repo = RepositoryRepository::new(database.pool().clone());

    let index = Arc::new(IndexManager::new(&config.search).map_err(|e| {
        error!("index manager failed to initialize: {}", e);
        anyhow::anyhow!(e)
    }).inspect_err(|_| {
        std::process::exit(EXIT_INDEX_ERROR);
    })?);
    info!("index manager initialized at {}", config.search.data_dir);

    let facet_cache = Arc::new(StaticFacetCache::new(config.search.facet_static_ttl_secs));

    let encryption = Arc::new(
        EncryptionService::new(&config.crawl.encryption_key).context("failed to initialize encryption service")?,
    );
    info!("encryption service initialized");

    let progress = Arc::new(ProgressTracker::new());

    let supervisor = Arc::new(CrawlerSupervisor::new(
        repository_repo.clone(),
        index.clone(),
        progress.clone(),
        encryption.clone(),
        config.crawl.clone(),
    ));
    supervisor.recover_on_startup().await;
    info!("crawler supervisor ready, crash-recovery scan complete");

    let scheduler = Arc::new(SchedulerService::new(repository_repo.clone(), supervisor.clone()));
    if let Err(e) = scheduler.start().await {
        error!("scheduler failed to start: {}", e);
    }

    let state = AppState {
        database,
        repository_repo,
        index,
        facet_cache,
        supervisor,
        progress,
        scheduler: Some(scheduler),
        config,
    };

    let app = api::create_router(state).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("listening on http://{}", bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}
