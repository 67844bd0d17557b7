use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::models::GeneratedGame;

/// Context handed to the generator for one book.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub book_title: String,
    pub book_description: Option<String>,
    pub tags: Vec<String>,
    pub count: usize,
}

/// Inference failures, classified for the retry loop and the orchestrator's
/// fallback decision.
#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    /// Every attempt ended in a timeout.
    #[error("Inference request timed out after all attempts")]
    Timeout,

    /// Retries exhausted on transient (5xx / connection) failures.
    #[error("Inference service unavailable: {0}")]
    Unavailable(String),

    /// Validation-style rejection (4xx). Never retried.
    #[error("Inference request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The model answered but no games could be parsed out of it.
    #[error("Unparseable model output: {0}")]
    InvalidResponse(String),
}

/// Client for the external generative model.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    /// Generates candidate games for a book.
    ///
    /// No partial state survives a failure: the call either yields a parsed
    /// game list or a typed error.
    async fn generate_games(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<GeneratedGame>, InferenceError>;
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Llama game generator via the Hugging Face chat-completions router.
#[derive(Clone)]
pub struct HuggingFaceClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_attempts: u32,
    backoff_base: Duration,
}

impl HuggingFaceClient {
    pub fn new(
        api_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> anyhow::Result<Self> {
        // The reqwest timeout is the cancellation boundary: when it fires,
        // the outbound request future is dropped, not merely unobserved.
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_url,
            api_key,
            model,
            max_attempts: max_attempts.max(1),
            backoff_base,
        })
    }

    /// Exponential backoff for the given 1-based attempt number.
    ///
    /// The exponent is capped so an oversized attempt count cannot overflow
    /// the shift or the duration multiply.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(exponent))
    }

    fn build_prompt(request: &GenerationRequest) -> String {
        let tags = request
            .tags
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "List {count} real popular video games about {tags}.\n\n\
             For each game provide:\n\
             - Name\n\
             - Release year\n\
             - Rating (0-5)\n\
             - Genre\n\
             - Brief description (1 sentence)\n\n\
             Format:\n\
             1. [Name] ([Year]) - Rating: [X.X]/5 - Genre: [Genre] - [Description]",
            count = request.count,
            tags = tags,
        )
    }

    async fn call_api(&self, prompt: &str) -> Result<String, AttemptFailure> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "max_tokens": 800,
            "temperature": 0.7,
            "top_p": 0.9,
        });

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptFailure::Timeout
                } else {
                    AttemptFailure::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(AttemptFailure::ServerError {
                    status: status.as_u16(),
                    body,
                });
            }
            return Err(AttemptFailure::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AttemptFailure::Connection(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(AttemptFailure::EmptyResponse)
    }
}

/// Per-attempt failure classification. Only timeouts, connection errors and
/// 5xx responses are retried.
enum AttemptFailure {
    Timeout,
    Connection(String),
    ServerError { status: u16, body: String },
    Rejected { status: u16, body: String },
    EmptyResponse,
}

#[async_trait::async_trait]
impl InferenceClient for HuggingFaceClient {
    async fn generate_games(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<GeneratedGame>, InferenceError> {
        let prompt = Self::build_prompt(request);
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 1..=self.max_attempts {
            match self.call_api(&prompt).await {
                Ok(content) => {
                    let games = parse_generated_games(&content, &request.tags);
                    if games.is_empty() {
                        tracing::error!(
                            response_head = %content.chars().take(200).collect::<String>(),
                            "No games parsed from model response"
                        );
                        return Err(InferenceError::InvalidResponse(
                            "model response contained no recognizable games".to_string(),
                        ));
                    }

                    tracing::info!(
                        attempt,
                        games = games.len(),
                        model = %self.model,
                        "Game generation succeeded"
                    );
                    return Ok(games.into_iter().take(request.count.max(1)).collect());
                }
                Err(AttemptFailure::Rejected { status, body }) => {
                    tracing::error!(status, "Inference request rejected, not retrying");
                    return Err(InferenceError::Rejected { status, body });
                }
                Err(AttemptFailure::EmptyResponse) => {
                    return Err(InferenceError::InvalidResponse(
                        "model returned no choices".to_string(),
                    ));
                }
                Err(failure) => {
                    let reason = match &failure {
                        AttemptFailure::Timeout => "timeout".to_string(),
                        AttemptFailure::Connection(e) => format!("connection error: {}", e),
                        AttemptFailure::ServerError { status, .. } => {
                            format!("server error {}", status)
                        }
                        _ => unreachable!(),
                    };

                    if attempt < self.max_attempts {
                        let delay = self.backoff_delay(attempt);
                        tracing::warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            reason = %reason,
                            "Inference attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(reason = %reason, "Inference attempts exhausted");
                    }
                    last_failure = Some(failure);
                }
            }
        }

        match last_failure {
            Some(AttemptFailure::Timeout) => Err(InferenceError::Timeout),
            Some(AttemptFailure::Connection(e)) => Err(InferenceError::Unavailable(e)),
            Some(AttemptFailure::ServerError { status, body }) => Err(
                InferenceError::Unavailable(format!("status {}: {}", status, body)),
            ),
            _ => Err(InferenceError::Unavailable(
                "no inference attempts were made".to_string(),
            )),
        }
    }
}

static GAME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\d+\.\s*(.+?)\s*\((\d{4})\)\s*-\s*Rating:\s*([\d.]+).*?-\s*Genre:\s*([^-]+?)\s*-\s*(.+)$",
    )
    .expect("game line regex is valid")
});

static INTRO_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(here are \d+|i (recommend|suggest|present)|below (is|are) (some|the)|based on your)")
        .expect("intro line regex is valid")
});

static MARKDOWN_EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(.+?)\*\*|\*(.+?)\*|__(.+?)__|_(.+?)_").expect("markdown regex is valid")
});

/// Strips `**bold**` / `*italic*` wrappers the model sometimes adds.
fn clean_markdown(text: &str) -> String {
    MARKDOWN_EMPHASIS
        .replace_all(text, |caps: &regex::Captures| {
            for group in 1..=4 {
                if let Some(m) = caps.get(group) {
                    return m.as_str().to_string();
                }
            }
            String::new()
        })
        .trim()
        .to_string()
}

/// Parses the model's numbered game list.
///
/// Primary path matches the structured `Name (Year) - Rating - Genre -
/// Description` format the prompt asks for; lines that only carry a name are
/// kept with the metadata left empty. Intro chatter is skipped.
fn parse_generated_games(content: &str, tags: &[String]) -> Vec<GeneratedGame> {
    let shared_tags: Vec<String> = tags.iter().take(5).cloned().collect();
    let mut games = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.len() < 10 || INTRO_LINE.is_match(line) {
            continue;
        }

        if let Some(caps) = GAME_LINE.captures(line) {
            let name = clean_markdown(&caps[1]);
            let released_year = caps[2].parse::<u16>().ok();
            let rating = caps[3].parse::<f32>().ok().map(|r| r.clamp(0.0, 5.0));
            let genres: Vec<String> = clean_markdown(&caps[4])
                .split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect();
            let description = clean_markdown(&caps[5]);

            games.push(GeneratedGame {
                id: GeneratedGame::id_for_name(&name),
                name,
                released_year,
                rating,
                genres,
                description: Some(description),
                tags: shared_tags.clone(),
            });
            continue;
        }

        // Fallback: a numbered line that at least names a game.
        let cleaned = line.trim_start_matches(['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '.', '-', '•', ' ']);
        if cleaned.len() < 4 || cleaned.contains(':') {
            continue;
        }

        let name_part = cleaned.split('(').next().unwrap_or(cleaned);
        let name = clean_markdown(name_part);
        let lower = name.to_lowercase();
        if name.len() <= 3
            || lower.starts_with("here")
            || lower.starts_with("below")
            || lower.starts_with("i recommend")
        {
            continue;
        }

        games.push(GeneratedGame {
            id: GeneratedGame::id_for_name(&name),
            name,
            released_year: None,
            rating: None,
            genres: Vec::new(),
            description: None,
            tags: shared_tags.clone(),
        });
    }

    games
}
