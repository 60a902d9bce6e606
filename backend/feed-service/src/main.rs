use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_service::cache::{BoundedCache, RedisListBackend};
use feed_service::config::Config;
use feed_service::db::{self, FeedStore, PgFeedStore, PgWideColumnBackend};
use feed_service::fanout::{BatchWriter, FanoutPipeline, FanoutQueue, Planner};
use feed_service::graph::WideColumnGraph;
use feed_service::handlers::{self, AppState};
use feed_service::pagination::Paginator;
use feed_service::services::{FeedService, MemoryItemProvider, TimelineService};
use wide_column::WideColumnStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting feed-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let pool = db::create_pool(&config.database)
        .await
        .context("failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    let store: Arc<dyn FeedStore> = Arc::new(PgFeedStore::new(pool.clone()));

    let redis = RedisListBackend::connect(&config.redis.url)
        .await
        .context("failed to connect to Redis")?;
    if let Err(e) = redis.ping().await {
        tracing::warn!(error = %e, "Redis ping failed, feed reads will fall back to Postgres");
    }
    let redis = Arc::new(redis);
    let feed_cache = BoundedCache::new(redis.clone(), config.cache_settings());
    let item_cache = BoundedCache::new(redis, config.cache_settings());

    let wide_column = WideColumnStore::new(
        Arc::new(PgWideColumnBackend::new(pool)),
        config.table_namespace(),
    );
    let graph = Arc::new(WideColumnGraph::new(wide_column));
    graph
        .ensure_tables()
        .await
        .context("failed to create relationship tables")?;

    let queue = FanoutQueue::start(
        BatchWriter::new(Arc::clone(&store), feed_cache.clone()),
        Planner::new(graph.clone(), config.fanout.batch_size),
        config.queue_settings(),
    );
    let fanout = FanoutPipeline::new(Arc::clone(&store), feed_cache.clone(), queue);

    let paginator = Paginator::new(config.pagination.page_size);
    let items = Arc::new(MemoryItemProvider::new());
    let state = web::Data::new(AppState {
        feeds: Arc::new(FeedService::new(store, feed_cache, paginator, fanout)),
        timelines: Arc::new(TimelineService::new(items.clone(), item_cache, paginator)),
        items,
        graph,
    });

    let bind = (config.app.host.clone(), config.app.port);
    info!("HTTP server listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route(
                "/metrics",
                web::get().to(feed_service::metrics::serve_metrics),
            )
            .configure(handlers::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
