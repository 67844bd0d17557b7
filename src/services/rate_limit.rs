use chrono::Utc;
use redis::AsyncCommands;
use redis::Client;

use crate::db::CacheKey;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Admitted,
    Rejected { retry_after_seconds: u64 },
}

impl RateLimitDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateLimitDecision::Admitted)
    }
}

/// Fixed-window request counter per subject.
///
/// A request is admitted only while the window's count is below the limit;
/// admission and increment happen in one atomic store operation.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    async fn try_acquire(
        &self,
        subject: &str,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision;
}

/// Redis-backed fixed-window limiter.
///
/// Windows are keyed by `floor(unix_now / window_seconds)`, counters by
/// `ratelimit:{subject}:{window_index}`. The counter increment is a single
/// INCR round trip, so concurrent requests from the same subject cannot race
/// past the limit.
///
/// Fail-open policy: if Redis is unreachable the request is admitted. The
/// limiter is a cost-control mechanism for expensive inference calls, not a
/// security boundary, so availability wins over strict enforcement.
#[derive(Clone)]
pub struct RedisRateLimiter {
    redis_client: Client,
}

impl RedisRateLimiter {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }

    async fn increment(&self, key: &str, window_seconds: u64) -> redis::RedisResult<u64> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let count: u64 = conn.incr(key, 1u64).await?;
        if count == 1 {
            // New window counter; keep it around past the boundary so a
            // clock-skewed reader never finds a dangling key.
            let _: () = conn.expire(key, (window_seconds * 2) as i64).await?;
        }

        Ok(count)
    }
}

#[async_trait::async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn try_acquire(
        &self,
        subject: &str,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision {
        if window_seconds == 0 {
            // A zero-length window cannot index a counter; treat limiting
            // as disabled rather than dividing by zero below.
            tracing::warn!(subject = %subject, "Zero-length rate window configured, admitting");
            return RateLimitDecision::Admitted;
        }

        let now = Utc::now().timestamp() as u64;
        let window_index = now / window_seconds;
        let key = CacheKey::RateLimit {
            subject: subject.to_string(),
            window_index,
        };

        match self.increment(&format!("{}", key), window_seconds).await {
            Ok(count) if count <= limit as u64 => RateLimitDecision::Admitted,
            Ok(count) => {
                let retry_after_seconds = window_seconds - (now % window_seconds);
                tracing::info!(
                    subject = %subject,
                    count,
                    limit,
                    "Rate limit exceeded"
                );
                RateLimitDecision::Rejected {
                    retry_after_seconds,
                }
            }
            Err(e) => {
                tracing::warn!(
                    subject = %subject,
                    error = %e,
                    "Rate limit store unreachable, failing open"
                );
                RateLimitDecision::Admitted
            }
        }
    }
}
