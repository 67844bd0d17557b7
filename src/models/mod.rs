use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal book identifier (the relational store's primary key, not a
/// Google Books volume ID).
pub type BookId = i64;

/// Internal user identifier.
pub type UserId = i64;

/// A book as seen by the recommendation pipeline: identity plus the
/// literary metadata the tag mapper needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub genres: Vec<String>,
}

/// A game from the catalog, used as a fallback candidate when the
/// inference path is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateGame {
    pub id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
}

/// A game produced by the inference model.
///
/// IDs are derived deterministically from the game name (UUID v5), so the
/// same game always maps to the same ID across generations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedGame {
    pub id: Uuid,
    pub name: String,
    pub released_year: Option<u16>,
    pub rating: Option<f32>,
    pub genres: Vec<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl GeneratedGame {
    /// Derives the stable ID for a game name. Case-insensitive so that
    /// "Skyrim" and "SKYRIM" collapse to one game.
    pub fn id_for_name(name: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.trim().to_lowercase().as_bytes())
    }
}

/// One scored entry in a recommendation, ordered by descending score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameScore {
    pub game_id: Uuid,
    pub name: String,
    /// Similarity in [0, 1].
    pub score: f32,
}

/// A complete recommendation as returned to the caller and stored in cache.
///
/// `cache_hit` is per-request metadata: it is not meaningful inside the
/// cached payload and is restamped by the orchestrator on every return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: UserId,
    pub book_id: BookId,
    /// Non-empty on success; ordered by descending score.
    pub games: Vec<GameScore>,
    /// False when the result came from the deterministic catalog fallback.
    pub ai_generated: bool,
    /// Mean of the per-game scores, in [0, 1].
    pub similarity_score: f32,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cache_hit: bool,
}
