use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::CacheStore;
use crate::services::recommendation::RecommendationService;

pub mod recommendations;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationService>,
    pub cache: Arc<dyn CacheStore>,
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", post(recommendations::recommend))
        .route("/recommendations/stats", get(recommendations::cache_stats))
}

/// Health check endpoint
///
/// Reports cache liveness for operators; an unavailable cache does not make
/// the service unhealthy because every request path degrades gracefully.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let cache_available = state.cache.ping().await;

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "cache_available": cache_available,
        })),
    )
}
