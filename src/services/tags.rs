use crate::models::Book;

/// Maximum number of tags forwarded to generation and scoring.
const MAX_TAGS: usize = 10;

/// Literary genre → game tag table.
///
/// Genres are substring-matched against the book's genre strings, so
/// "Juvenile Fiction / Fantasy & Magic" still maps through "fantasy".
const GENRE_TAG_MAPPING: &[(&str, &[&str])] = &[
    ("fantasy", &["fantasy", "magic", "dragons", "medieval"]),
    ("science fiction", &["sci-fi", "space", "futuristic", "cyberpunk"]),
    ("adventure", &["adventure", "exploration", "open-world"]),
    ("mystery", &["mystery", "detective", "crime", "investigation"]),
    ("thriller", &["thriller", "suspense", "psychological"]),
    ("horror", &["horror", "survival-horror", "dark", "gore"]),
    ("romance", &["romance", "dating-sim", "story-rich"]),
    ("historical", &["historical", "realistic", "war"]),
    ("action", &["action", "combat", "fast-paced"]),
    ("drama", &["drama", "story-rich", "emotional"]),
    ("comedy", &["comedy", "funny", "casual"]),
    ("dystopian", &["post-apocalyptic", "dystopian", "survival"]),
    ("post-apocalyptic", &["post-apocalyptic", "survival", "zombies"]),
    ("superhero", &["superhero", "super-powers", "comic-book"]),
    ("crime", &["crime", "mafia", "heist"]),
    ("war", &["war", "military", "tactical"]),
    ("magic", &["magic", "spells", "wizards"]),
    ("dark", &["dark", "dark-fantasy", "mature"]),
    ("epic", &["epic", "grand-strategy", "story-rich"]),
];

/// Keyword table used when neither genres nor genre words in the text match.
const KEYWORD_TAG_MAPPING: &[(&str, &[&str])] = &[
    ("technology", &["sci-fi", "cyberpunk", "simulation"]),
    ("business", &["strategy", "management", "simulation"]),
    ("war", &["war", "strategy", "military"]),
    ("history", &["historical", "strategy"]),
    ("space", &["space", "sci-fi", "exploration"]),
    ("crime", &["crime", "action", "thriller"]),
    ("spy", &["stealth", "action", "thriller"]),
    ("detective", &["mystery", "detective", "investigation"]),
];

/// Generic tags used as the last resort so the pipeline always has something
/// to generate and score against.
const GENERIC_TAGS: &[&str] = &["story-rich", "adventure", "singleplayer"];

fn push_unique(tags: &mut Vec<String>, candidates: &[&str]) {
    for candidate in candidates {
        if !tags.iter().any(|t| t == candidate) {
            tags.push(candidate.to_string());
        }
    }
}

/// Maps a book's literary genres to game tags.
///
/// Resolution order: genre table against the book's genres, then genre words
/// found in the title/description, then specific keywords, then generic
/// tags. Output is deduplicated, capped at 10, and ordered by the static
/// tables so the same book always yields the same tags.
pub fn map_genres_to_tags(book: &Book) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    for genre in &book.genres {
        let genre_lower = genre.to_lowercase();
        for (name, genre_tags) in GENRE_TAG_MAPPING {
            if genre_lower.contains(name) {
                push_unique(&mut tags, genre_tags);
                break;
            }
        }
    }

    if tags.is_empty() {
        let combined = format!(
            "{} {}",
            book.title.to_lowercase(),
            book.description.as_deref().unwrap_or("").to_lowercase()
        );

        for (name, genre_tags) in GENRE_TAG_MAPPING {
            if combined.contains(name) {
                push_unique(&mut tags, &genre_tags[..genre_tags.len().min(2)]);
                if tags.len() >= MAX_TAGS {
                    break;
                }
            }
        }

        if tags.is_empty() {
            for (keyword, keyword_tags) in KEYWORD_TAG_MAPPING {
                if combined.contains(keyword) {
                    push_unique(&mut tags, &keyword_tags[..keyword_tags.len().min(2)]);
                }
            }
        }

        if tags.is_empty() {
            tracing::warn!(book_id = book.id, "No specific tags found, using generic tags");
            push_unique(&mut tags, GENERIC_TAGS);
        }
    }

    tags.truncate(MAX_TAGS);
    tags
}
