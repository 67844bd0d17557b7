use std::sync::Arc;
use std::time::Duration;

use book2game_api::config::Config;
use book2game_api::db::{
    create_pool, create_redis_client, PgBookStore, PgGameCatalog, PgRecommendationStore, RedisCache,
};
use book2game_api::routes::{create_router, AppState};
use book2game_api::services::inference::HuggingFaceClient;
use book2game_api::services::rate_limit::RedisRateLimiter;
use book2game_api::services::recommendation::{RecommendationService, RecommendationSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = RedisCache::new(redis_client.clone());
    let cache = Arc::new(cache);

    let rate_limiter = Arc::new(RedisRateLimiter::new(redis_client));

    let pool = create_pool(&config.database_url).await?;
    let books = Arc::new(PgBookStore::new(pool.clone()));
    let games = Arc::new(PgGameCatalog::new(pool.clone()));
    let history = Arc::new(PgRecommendationStore::new(pool));

    let inference = Arc::new(HuggingFaceClient::new(
        config.huggingface_api_url.clone(),
        config.huggingface_api_key.clone(),
        config.generation_model.clone(),
        Duration::from_secs(config.inference_timeout_seconds),
        config.inference_max_attempts,
        Duration::from_millis(config.inference_backoff_base_ms),
    )?);

    let recommendations = Arc::new(RecommendationService::new(
        cache.clone(),
        rate_limiter,
        inference,
        books,
        games,
        history,
        RecommendationSettings {
            cache_ttl_seconds: config.recommendation_ttl_seconds,
            rate_limit: config.generation_rate_limit,
            rate_window_seconds: config.generation_rate_window_seconds,
            lock_wait: Duration::from_secs(config.generation_lock_wait_seconds),
        },
    ));

    let state = AppState {
        recommendations,
        cache,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush pending cache writes before exiting.
    cache_writer.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown signal handler");
    }
}
