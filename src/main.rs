use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shortener::analytics::AnalyticsAggregator;
use shortener::cache::MokaPopularityCache;
use shortener::clicks::{ClickPipeline, ClickPipelineConfig};
use shortener::config::{Config, DatabaseBackend};
use shortener::links::LinkDirectory;
use shortener::storage::{
    AnalyticsStore, LinkStore, MemoryStorage, PostgresStorage, SqliteStorage,
};
use shortener::{api, redirect};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Loaded configuration");

    // Initialize storage
    let (links, clicks): (Arc<dyn LinkStore>, Arc<dyn AnalyticsStore>) =
        match config.database.backend {
            DatabaseBackend::Sqlite => {
                info!("Using SQLite storage: {}", config.database.url);
                let storage = Arc::new(
                    SqliteStorage::new(&config.database.url, config.database.max_connections)
                        .await?,
                );
                (storage.clone(), storage)
            }
            DatabaseBackend::Postgres => {
                info!("Using PostgreSQL storage");
                let storage = Arc::new(
                    PostgresStorage::new(&config.database.url, config.database.max_connections)
                        .await?,
                );
                (storage.clone(), storage)
            }
            DatabaseBackend::Memory => {
                info!("Using in-memory storage, data will not survive restarts");
                let storage = Arc::new(MemoryStorage::new());
                (storage.clone(), storage)
            }
        };

    info!("Initializing database...");
    links.init().await.context("failed to initialize link storage")?;
    clicks
        .init_analytics()
        .await
        .context("failed to initialize click storage")?;
    info!("Database initialized successfully");

    let cache = Arc::new(MokaPopularityCache::new(
        config.cache.capacity,
        config.cache.ttl(),
        config.cache.min_uses_before_caching,
    ));
    let directory = Arc::new(
        LinkDirectory::new(links, cache, config.links.max_link_len)
            .with_max_generation_attempts(config.links.max_generation_attempts),
    );
    let aggregator = Arc::new(AnalyticsAggregator::new(Arc::clone(&clicks)));

    // Start click batching
    let pipeline = Arc::new(ClickPipeline::new(
        clicks,
        ClickPipelineConfig {
            capacity: config.clicks.buffer_capacity,
            period: config.clicks.batching_period(),
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = pipeline.start(shutdown_rx)?;

    let app = Router::new()
        .merge(api::create_api_router(Arc::clone(&directory), aggregator))
        .merge(redirect::create_redirect_router(directory, Arc::clone(&pipeline)))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http_server.host, config.http_server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped, stopping click pipeline...");

    let _ = shutdown_tx.send(true);
    flusher.await.context("click pipeline task failed")?;
    info!("Background tasks stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
