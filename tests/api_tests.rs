mod common;

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::json;

use book2game_api::routes::{create_router, AppState};
use book2game_api::services::recommendation::{RecommendationService, RecommendationSettings};

use common::*;

struct TestApp {
    server: TestServer,
    cache: Arc<MemoryCache>,
}

fn test_app(inference: FakeInference, rate_limit: u32) -> TestApp {
    let cache = arc(MemoryCache::new());
    let service = Arc::new(RecommendationService::new(
        cache.clone(),
        arc(MemoryRateLimiter::new()),
        arc(inference),
        arc(MemoryBookStore::with_books(vec![fantasy_book(1)])),
        arc(MemoryCatalog::with_games(vec![candidate_game(
            "Realm of Spells",
            &["fantasy", "magic"],
        )])),
        arc(MemoryHistory::new()),
        RecommendationSettings {
            cache_ttl_seconds: 86400,
            rate_limit,
            rate_window_seconds: 60,
            lock_wait: Duration::from_secs(10),
        },
    ));

    let state = AppState {
        recommendations: service,
        cache: cache.clone(),
    };
    let server = TestServer::new(create_router(state)).unwrap();

    TestApp { server, cache }
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app(FakeInference::succeeding(fake_games()), 100);

    let response = app.server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache_available"], true);
}

#[tokio::test]
async fn test_health_check_reports_cache_outage() {
    let app = test_app(FakeInference::succeeding(fake_games()), 100);
    app.cache.set_available(false);

    let response = app.server.get("/health").await;

    // An unavailable cache degrades performance, not health.
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["cache_available"], false);
}

#[tokio::test]
async fn test_create_recommendation() {
    let app = test_app(FakeInference::succeeding(fake_games()), 100);

    let response = app
        .server
        .post("/api/v1/recommendations")
        .json(&json!({
            "user_id": 7,
            "book_id": 1
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["user_id"], 7);
    assert_eq!(body["book_id"], 1);
    assert_eq!(body["ai_generated"], true);
    assert_eq!(body["cache_hit"], false);
    assert!(!body["games"].as_array().unwrap().is_empty());
    assert!(body["similarity_score"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let app = test_app(FakeInference::succeeding(fake_games()), 100);
    let request = json!({ "user_id": 7, "book_id": 1 });

    let first = app.server.post("/api/v1/recommendations").json(&request).await;
    first.assert_status(axum::http::StatusCode::CREATED);

    let second = app.server.post("/api/v1/recommendations").json(&request).await;
    second.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = second.json();
    assert_eq!(body["cache_hit"], true);
}

#[tokio::test]
async fn test_rate_limited_request_is_rejected() {
    let app = test_app(FakeInference::succeeding(fake_games()), 1);
    let request = json!({ "user_id": 7, "book_id": 1 });

    app.server.post("/api/v1/recommendations").json(&request).await;

    let response = app.server.post("/api/v1/recommendations").json(&request).await;
    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("Rate limit"));
}

#[tokio::test]
async fn test_unknown_book_is_not_found() {
    let app = test_app(FakeInference::succeeding(fake_games()), 100);

    let response = app
        .server
        .post("/api/v1/recommendations")
        .json(&json!({
            "user_id": 7,
            "book_id": 999
        }))
        .await;

    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generation_unavailable_without_fallback_candidates() {
    // Failing inference plus an empty catalog leaves nothing to rank.
    let cache = arc(MemoryCache::new());
    let service = Arc::new(RecommendationService::new(
        cache.clone(),
        arc(MemoryRateLimiter::new()),
        arc(FakeInference::failing()),
        arc(MemoryBookStore::with_books(vec![fantasy_book(1)])),
        arc(MemoryCatalog::with_games(Vec::new())),
        arc(MemoryHistory::new()),
        RecommendationSettings::default(),
    ));
    let server = TestServer::new(create_router(AppState {
        recommendations: service,
        cache,
    }))
    .unwrap();

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({
            "user_id": 7,
            "book_id": 1
        }))
        .await;

    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_fallback_recommendation_is_not_marked_ai() {
    let app = test_app(FakeInference::failing(), 100);

    let response = app
        .server
        .post("/api/v1/recommendations")
        .json(&json!({
            "user_id": 7,
            "book_id": 1
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["ai_generated"], false);
    assert_eq!(body["games"][0]["name"], "Realm of Spells");
}

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let app = test_app(FakeInference::succeeding(fake_games()), 100);
    let request = json!({ "user_id": 7, "book_id": 1 });

    app.server.post("/api/v1/recommendations").json(&request).await;
    app.server.post("/api/v1/recommendations").json(&request).await;

    let response = app.server.get("/api/v1/recommendations/stats").await;
    response.assert_status_ok();

    let stats: serde_json::Value = response.json();
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["hit_rate"], 0.5);
}

#[tokio::test]
async fn test_malformed_request_is_rejected() {
    let app = test_app(FakeInference::succeeding(fake_games()), 100);

    let response = app
        .server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": 7 }))
        .await;

    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}
