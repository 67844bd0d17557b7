use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use crate::db::{BookStore, GameCatalog, RecommendationStore};
use crate::error::{AppError, AppResult};
use crate::models::{Book, BookId, CandidateGame, Recommendation};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

#[derive(FromRow)]
struct BookRow {
    id: i64,
    title: String,
    description: Option<String>,
    genres: Vec<String>,
}

/// Book lookup backed by the relational store
#[derive(Clone)]
pub struct PgBookStore {
    pool: PgPool,
}

impl PgBookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BookStore for PgBookStore {
    async fn get_book(&self, book_id: BookId) -> AppResult<Book> {
        let row: Option<BookRow> = sqlx::query_as(
            "SELECT id, title, description, genres FROM books WHERE id = $1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))?;

        Ok(Book {
            id: row.id,
            title: row.title,
            description: row.description,
            genres: row.genres,
        })
    }
}

#[derive(FromRow)]
struct GameRow {
    id: Uuid,
    name: String,
    tags: Vec<String>,
}

/// Candidate pool queries against the game catalog
#[derive(Clone)]
pub struct PgGameCatalog {
    pool: PgPool,
}

impl PgGameCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl GameCatalog for PgGameCatalog {
    /// Tag-overlap query; stable id ordering keeps fallback ranking
    /// reproducible across calls.
    async fn list_candidate_games(&self, tags: &[String]) -> AppResult<Vec<CandidateGame>> {
        let rows: Vec<GameRow> = sqlx::query_as(
            "SELECT id, name, tags FROM games WHERE tags && $1 ORDER BY id LIMIT 50",
        )
        .bind(tags)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CandidateGame {
                id: row.id,
                name: row.name,
                tags: row.tags,
            })
            .collect())
    }
}

/// Durable recommendation history
#[derive(Clone)]
pub struct PgRecommendationStore {
    pool: PgPool,
}

impl PgRecommendationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgRecommendationStore {
    async fn save(&self, recommendation: &Recommendation) -> AppResult<()> {
        let games = serde_json::to_value(&recommendation.games)
            .map_err(|e| AppError::Internal(format!("Recommendation serialization error: {}", e)))?;

        sqlx::query(
            "INSERT INTO recommendations \
             (id, user_id, book_id, games, ai_generated, similarity_score, processing_time_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(recommendation.id)
        .bind(recommendation.user_id)
        .bind(recommendation.book_id)
        .bind(games)
        .bind(recommendation.ai_generated)
        .bind(recommendation.similarity_score)
        .bind(recommendation.processing_time_ms as i64)
        .bind(recommendation.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
