use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::db::{BookStore, CacheKey, CacheStore, GameCatalog, RecommendationStore};
use crate::error::{AppError, AppResult};
use crate::models::{Book, BookId, GameScore, Recommendation, UserId};
use crate::services::inference::{GenerationRequest, InferenceClient};
use crate::services::locks::LockTable;
use crate::services::rate_limit::{RateLimitDecision, RateLimiter};
use crate::services::scorer::{self, ScoringCandidate};
use crate::services::tags;

/// Games requested from the generator per recommendation.
const GENERATION_COUNT: usize = 10;

/// Cache hit/miss counters for the recommendation cache.
#[derive(Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Snapshot of cache metrics, served by the stats endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl CacheMetrics {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Tuning knobs for the orchestrator, derived from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct RecommendationSettings {
    pub cache_ttl_seconds: u64,
    pub rate_limit: u32,
    pub rate_window_seconds: u64,
    pub lock_wait: Duration,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 86400,
            rate_limit: 5,
            rate_window_seconds: 60,
            lock_wait: Duration::from_secs(35),
        }
    }
}

/// Orchestrates rate limiting, caching, single-flight generation, scoring
/// and fallback for book-to-game recommendations.
///
/// Request flow: rate limit → cache lookup → on miss: per-book lock →
/// cache re-check (wait-and-reuse) → book lookup → tag mapping → inference
/// (catalog fallback on failure) → rank → cache write → return.
pub struct RecommendationService {
    cache: Arc<dyn CacheStore>,
    rate_limiter: Arc<dyn RateLimiter>,
    inference: Arc<dyn InferenceClient>,
    books: Arc<dyn BookStore>,
    games: Arc<dyn GameCatalog>,
    history: Arc<dyn RecommendationStore>,
    locks: LockTable,
    metrics: CacheMetrics,
    settings: RecommendationSettings,
}

impl RecommendationService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        rate_limiter: Arc<dyn RateLimiter>,
        inference: Arc<dyn InferenceClient>,
        books: Arc<dyn BookStore>,
        games: Arc<dyn GameCatalog>,
        history: Arc<dyn RecommendationStore>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            cache,
            rate_limiter,
            inference,
            books,
            games,
            history,
            locks: LockTable::new(),
            metrics: CacheMetrics::default(),
            settings,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.metrics.stats()
    }

    /// Produces a scored game recommendation for (user, book).
    ///
    /// Cached results are reused within the TTL; at most one generation per
    /// book is in flight at a time, and concurrent callers reuse its result.
    pub async fn get_or_create_recommendation(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> AppResult<Recommendation> {
        let started = Instant::now();

        let subject = format!("recommendation:{}", user_id);
        let decision = self
            .rate_limiter
            .try_acquire(
                &subject,
                self.settings.rate_limit,
                self.settings.rate_window_seconds,
            )
            .await;
        if let RateLimitDecision::Rejected {
            retry_after_seconds,
        } = decision
        {
            return Err(AppError::RateLimited {
                retry_after_seconds,
            });
        }

        let cache_key = CacheKey::Recommendation(book_id);

        if let Some(cached) = self.lookup_cached(&cache_key).await {
            self.metrics.record_hit();
            tracing::info!(book_id, "Recommendation cache hit");
            return Ok(self.finish_from_cache(cached, user_id, started));
        }
        self.metrics.record_miss();
        tracing::info!(book_id, "Recommendation cache miss, generating");

        // Single-flight: hold the per-book lock for the expensive
        // generate-and-cache sequence. On wait timeout we generate
        // independently rather than stall forever.
        let _lock = self.locks.acquire(book_id, self.settings.lock_wait).await;

        // A concurrent flight may have populated the cache while we waited.
        if let Some(cached) = self.lookup_cached(&cache_key).await {
            tracing::info!(book_id, "Reusing result from concurrent generation");
            return Ok(self.finish_from_cache(cached, user_id, started));
        }

        let book = self.books.get_book(book_id).await?;
        let book_tags = tags::map_genres_to_tags(&book);

        let (candidates, ai_generated) = self.generate_candidates(&book, &book_tags).await?;
        let ranked = scorer::rank(&book_tags, &candidates);

        if ranked.is_empty() {
            tracing::warn!(book_id, ?book_tags, "No suitable games for book");
            return Err(AppError::GenerationUnavailable(
                "Could not find suitable games for this book. \
                 Try a book with a more defined genre (fantasy, sci-fi, adventure, etc.)"
                    .to_string(),
            ));
        }

        let recommendation = self.assemble(user_id, book_id, ranked, ai_generated, started);

        self.write_cache(&cache_key, &recommendation).await;
        self.save_history(recommendation.clone());

        tracing::info!(
            book_id,
            ai_generated,
            games = recommendation.games.len(),
            similarity_score = recommendation.similarity_score,
            processing_time_ms = recommendation.processing_time_ms,
            "Recommendation generated"
        );

        Ok(recommendation)
    }

    async fn lookup_cached(&self, key: &CacheKey) -> Option<Recommendation> {
        let json = self.cache.get(key).await?;
        match serde_json::from_str(&json) {
            Ok(recommendation) => Some(recommendation),
            Err(e) => {
                // A corrupt entry is a miss; it will be overwritten below.
                tracing::warn!(key = %key, error = %e, "Discarding undeserializable cache entry");
                None
            }
        }
    }

    /// Restamps per-request fields on a cached recommendation and records it
    /// in the caller's history.
    fn finish_from_cache(
        &self,
        mut recommendation: Recommendation,
        user_id: UserId,
        started: Instant,
    ) -> Recommendation {
        recommendation.user_id = user_id;
        recommendation.cache_hit = true;
        recommendation.processing_time_ms = started.elapsed().as_millis() as u64;

        // Every serve gets its own history row. The cached id stays on the
        // response; reusing it for the insert would collide on repeat hits.
        let mut record = recommendation.clone();
        record.id = Uuid::new_v4();
        self.save_history(record);

        recommendation
    }

    /// Runs the inference path, falling back to deterministic tag-overlap
    /// selection from the catalog when inference fails.
    ///
    /// Returns the candidate pool and whether it was AI-generated.
    async fn generate_candidates(
        &self,
        book: &Book,
        book_tags: &[String],
    ) -> AppResult<(Vec<ScoringCandidate>, bool)> {
        let request = GenerationRequest {
            book_title: book.title.clone(),
            book_description: book.description.clone(),
            tags: book_tags.to_vec(),
            count: GENERATION_COUNT,
        };

        match self.inference.generate_games(&request).await {
            Ok(games) => Ok((games.iter().map(ScoringCandidate::from).collect(), true)),
            Err(e) => {
                tracing::warn!(
                    book_id = book.id,
                    error = %e,
                    "Inference failed, falling back to catalog candidates"
                );

                let candidates = self.games.list_candidate_games(book_tags).await?;
                Ok((candidates.iter().map(ScoringCandidate::from).collect(), false))
            }
        }
    }

    fn assemble(
        &self,
        user_id: UserId,
        book_id: BookId,
        games: Vec<GameScore>,
        ai_generated: bool,
        started: Instant,
    ) -> Recommendation {
        let similarity_score =
            games.iter().map(|g| g.score).sum::<f32>() / games.len() as f32;

        Recommendation {
            id: Uuid::new_v4(),
            user_id,
            book_id,
            games,
            ai_generated,
            similarity_score: (similarity_score * 100.0).round() / 100.0,
            processing_time_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
            cache_hit: false,
        }
    }

    async fn write_cache(&self, key: &CacheKey, recommendation: &Recommendation) {
        match serde_json::to_string(recommendation) {
            Ok(json) => {
                self.cache
                    .set(key, json, self.settings.cache_ttl_seconds)
                    .await;
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Recommendation serialization error");
            }
        }
    }

    /// Fire-and-forget durable save; failures only produce a log line.
    fn save_history(&self, recommendation: Recommendation) {
        let history = Arc::clone(&self.history);
        tokio::spawn(async move {
            if let Err(e) = history.save(&recommendation).await {
                tracing::warn!(
                    recommendation_id = %recommendation.id,
                    error = %e,
                    "Failed to save recommendation history"
                );
            }
        });
    }
}
