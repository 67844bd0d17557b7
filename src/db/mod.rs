pub mod postgres;
pub mod redis;

pub use postgres::{create_pool, PgBookStore, PgGameCatalog, PgRecommendationStore};
pub use redis::{create_redis_client, CacheKey, CacheWriterHandle, RedisCache};

use crate::error::AppResult;
use crate::models::{Book, BookId, CandidateGame, Recommendation};

/// Key-value cache with TTL and graceful degradation.
///
/// Implementations absorb every transport error: `get` reports an
/// unreachable backend as a miss and `set` is best-effort. The rest of the
/// system never observes a cache-transport failure.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the cached value, or `None` on miss, expiry, or backend failure.
    async fn get(&self, key: &CacheKey) -> Option<String>;

    /// Best-effort write; failures are logged and swallowed.
    async fn set(&self, key: &CacheKey, value: String, ttl_seconds: u64);

    /// Liveness probe for operational tooling. Does not gate request handling.
    async fn ping(&self) -> bool;
}

/// Book lookup collaborator (the persistent record store, consumed by id).
#[async_trait::async_trait]
pub trait BookStore: Send + Sync {
    /// Fails with `AppError::NotFound` for unknown ids.
    async fn get_book(&self, book_id: BookId) -> AppResult<Book>;
}

/// Game catalog collaborator used to build the fallback candidate pool.
#[async_trait::async_trait]
pub trait GameCatalog: Send + Sync {
    /// Returns games sharing at least one of the given tags, in stable order.
    async fn list_candidate_games(&self, tags: &[String]) -> AppResult<Vec<CandidateGame>>;
}

/// Optional durability layer for recommendations.
///
/// The orchestrator calls `save` fire-and-forget; failures are logged only.
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn save(&self, recommendation: &Recommendation) -> AppResult<()>;
}
