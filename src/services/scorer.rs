use std::collections::HashSet;

use crate::models::{GameScore, GeneratedGame};
use uuid::Uuid;

/// Maximum number of games kept in a ranking.
pub const MAX_RANKED_GAMES: usize = 5;

/// A scoring candidate: any game with a name, an id, and a tag set.
///
/// Both AI-generated games and catalog fallback candidates pass through the
/// same ranking so results stay comparable across the two paths.
#[derive(Debug, Clone)]
pub struct ScoringCandidate {
    pub game_id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
}

impl From<&GeneratedGame> for ScoringCandidate {
    fn from(game: &GeneratedGame) -> Self {
        Self {
            game_id: game.id,
            name: game.name.clone(),
            tags: game.tags.clone(),
        }
    }
}

impl From<&crate::models::CandidateGame> for ScoringCandidate {
    fn from(game: &crate::models::CandidateGame) -> Self {
        Self {
            game_id: game.id,
            name: game.name.clone(),
            tags: game.tags.clone(),
        }
    }
}

fn normalize(tags: &[String]) -> HashSet<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Computes tag similarity between a book's mapped tags and a game's tags.
///
/// Jaccard index over normalized (trimmed, lowercased) tag sets, defined as
/// 0.0 when both sets are empty. Pure and deterministic. Jaccard is
/// monotonic in the sense the ranking relies on: a shared tag can only raise
/// the score, an unshared tag can only lower it.
pub fn score(book_tags: &[String], game_tags: &[String]) -> f32 {
    let book = normalize(book_tags);
    let game = normalize(game_tags);

    let intersection = book.intersection(&game).count();
    let union = book.union(&game).count();

    if union == 0 {
        return 0.0;
    }

    intersection as f32 / union as f32
}

/// Scores and ranks candidates against the book's tags.
///
/// Scores are computed independently, zero-score candidates are dropped, and
/// the rest are sorted descending. The sort is stable, so ties keep their
/// first-seen input order and results are reproducible.
pub fn rank(book_tags: &[String], candidates: &[ScoringCandidate]) -> Vec<GameScore> {
    let mut scored: Vec<GameScore> = candidates
        .iter()
        .map(|candidate| GameScore {
            game_id: candidate.game_id,
            name: candidate.name.clone(),
            score: score(book_tags, &candidate.tags),
        })
        .filter(|game| game.score > 0.0)
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(MAX_RANKED_GAMES);
    scored
}
