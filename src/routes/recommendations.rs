use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{BookId, Recommendation, UserId},
    routes::AppState,
    services::recommendation::CacheStats,
};

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: UserId,
    pub book_id: BookId,
}

/// Handler for the recommendation generation endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<(StatusCode, Json<Recommendation>)> {
    let recommendation = state
        .recommendations
        .get_or_create_recommendation(request.user_id, request.book_id)
        .await?;

    Ok((StatusCode::CREATED, Json(recommendation)))
}

/// Handler for recommendation cache statistics
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.recommendations.cache_stats())
}
