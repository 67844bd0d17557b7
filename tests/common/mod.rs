//! In-memory fakes for the orchestration tests.
//!
//! Each fake implements one of the injected store traits so tests can run
//! the full recommendation flow without Redis, Postgres, or the inference
//! API. Time-sensitive fakes use `tokio::time::Instant` so paused-clock
//! tests can drive TTL and window expiry deterministically.

// Not every test binary uses every fake.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use book2game_api::db::{BookStore, CacheKey, CacheStore, GameCatalog, RecommendationStore};
use book2game_api::error::{AppError, AppResult};
use book2game_api::models::{
    Book, BookId, CandidateGame, GeneratedGame, Recommendation,
};
use book2game_api::services::inference::{GenerationRequest, InferenceClient, InferenceError};
use book2game_api::services::rate_limit::{RateLimitDecision, RateLimiter};

/// Lazily-expiring in-memory cache with a switchable outage mode.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    available: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn unavailable() -> Self {
        let cache = Self::new();
        cache.available.store(false, Ordering::SeqCst);
        cache
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<String> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }

        let entries = self.entries.lock().unwrap();
        let (value, deadline) = entries.get(&format!("{}", key))?;
        // Lazy expiry: stale entries are absent even though still stored.
        if Instant::now() >= *deadline {
            return None;
        }
        Some(value.clone())
    }

    async fn set(&self, key: &CacheKey, value: String, ttl_seconds: u64) {
        if !self.available.load(Ordering::SeqCst) {
            return;
        }

        let deadline = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .unwrap()
            .insert(format!("{}", key), (value, deadline));
    }

    async fn ping(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Fixed-window in-memory rate limiter keyed off elapsed test time.
pub struct MemoryRateLimiter {
    started: Instant,
    counts: Mutex<HashMap<(String, u64), u32>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn try_acquire(
        &self,
        subject: &str,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision {
        let elapsed = self.started.elapsed().as_secs();
        let window_index = elapsed / window_seconds;

        let mut counts = self.counts.lock().unwrap();
        let count = counts
            .entry((subject.to_string(), window_index))
            .or_insert(0);
        *count += 1;

        if *count <= limit {
            RateLimitDecision::Admitted
        } else {
            RateLimitDecision::Rejected {
                retry_after_seconds: window_seconds - (elapsed % window_seconds),
            }
        }
    }
}

/// Inference fake that counts calls and either succeeds after an optional
/// delay or always fails.
pub struct FakeInference {
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
    games: Vec<GeneratedGame>,
}

impl FakeInference {
    pub fn succeeding(games: Vec<GeneratedGame>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            fail: false,
            games,
        }
    }

    pub fn slow(games: Vec<GeneratedGame>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::succeeding(games)
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            fail: true,
            games: Vec::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl InferenceClient for FakeInference {
    async fn generate_games(
        &self,
        _request: &GenerationRequest,
    ) -> Result<Vec<GeneratedGame>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(InferenceError::Unavailable(
                "all retry attempts exhausted".to_string(),
            ));
        }

        Ok(self.games.clone())
    }
}

/// Book store holding a fixed set of books.
pub struct MemoryBookStore {
    books: HashMap<BookId, Book>,
}

impl MemoryBookStore {
    pub fn with_books(books: Vec<Book>) -> Self {
        Self {
            books: books.into_iter().map(|b| (b.id, b)).collect(),
        }
    }
}

#[async_trait::async_trait]
impl BookStore for MemoryBookStore {
    async fn get_book(&self, book_id: BookId) -> AppResult<Book> {
        self.books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", book_id)))
    }
}

/// Catalog returning all games that share at least one tag, in input order.
pub struct MemoryCatalog {
    games: Vec<CandidateGame>,
}

impl MemoryCatalog {
    pub fn with_games(games: Vec<CandidateGame>) -> Self {
        Self { games }
    }
}

#[async_trait::async_trait]
impl GameCatalog for MemoryCatalog {
    async fn list_candidate_games(&self, tags: &[String]) -> AppResult<Vec<CandidateGame>> {
        Ok(self
            .games
            .iter()
            .filter(|game| {
                game.tags
                    .iter()
                    .any(|tag| tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            })
            .cloned()
            .collect())
    }
}

/// History sink that records every saved recommendation.
#[derive(Default)]
pub struct MemoryHistory {
    saved: Mutex<Vec<Recommendation>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn saved_ids(&self) -> Vec<uuid::Uuid> {
        self.saved.lock().unwrap().iter().map(|r| r.id).collect()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryHistory {
    async fn save(&self, recommendation: &Recommendation) -> AppResult<()> {
        self.saved.lock().unwrap().push(recommendation.clone());
        Ok(())
    }
}

// Builders shared across test files.

pub fn fantasy_book(id: BookId) -> Book {
    Book {
        id,
        title: "The Name of the Wind".to_string(),
        description: Some("A gifted young arcanist's story".to_string()),
        genres: vec!["Fantasy".to_string(), "Adventure".to_string()],
    }
}

pub fn generated_game(name: &str, tags: &[&str]) -> GeneratedGame {
    GeneratedGame {
        id: GeneratedGame::id_for_name(name),
        name: name.to_string(),
        released_year: Some(2018),
        rating: Some(4.4),
        genres: vec!["RPG".to_string()],
        description: Some(format!("{} description", name)),
        tags: tags.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn candidate_game(name: &str, tags: &[&str]) -> CandidateGame {
    CandidateGame {
        id: GeneratedGame::id_for_name(name),
        name: name.to_string(),
        tags: tags.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn fake_games() -> Vec<GeneratedGame> {
    vec![
        generated_game("Dragon Quest", &["fantasy", "magic"]),
        generated_game("Trailblazer", &["adventure", "exploration"]),
        generated_game("Spellbound", &["magic", "fantasy", "dragons"]),
    ]
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
