//! Rate limiter using token bucket algorithm.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::config::CrawlLimits;

/// Token bucket shared by the workers of one crawl.
pub struct RateLimiter {
    state: Arc<Mutex<RateLimiterState>>,
}

struct RateLimiterState {
    tokens: f64,
    last_update: Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    min_delay: Duration,
    max_delay: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `requests_per_minute` - Maximum requests per minute
    /// * `min_delay_secs` - Minimum jitter added to each request
    /// * `max_delay_secs` - Maximum jitter added to each request
    ///
    /// The bucket starts with a single token, so a run ramps up instead of
    /// bursting a full minute of requests.
    pub fn new(requests_per_minute: u32, min_delay_secs: f64, max_delay_secs: f64) -> Self {
        let max_tokens = f64::from(requests_per_minute.max(1));
        let refill_rate = max_tokens / 60.0;

        Self {
            state: Arc::new(Mutex::new(RateLimiterState {
                tokens: 1.0,
                last_update: Instant::now(),
                max_tokens,
                refill_rate,
                min_delay: Duration::from_secs_f64(min_delay_secs),
                max_delay: Duration::from_secs_f64(max_delay_secs.max(min_delay_secs)),
            })),
        }
    }

    /// Limiter for a bookmaker's effective limits, if it has a rate cap.
    pub fn from_limits(limits: &CrawlLimits) -> Option<Self> {
        limits
            .max_requests_per_minute
            .map(|rpm| Self::new(rpm, 0.0, 0.25))
    }

    /// Acquire a token, waiting if necessary
    pub async fn acquire(&self) {
        let delay = self.reserve().await;
        tokio::time::sleep(delay).await;
    }

    /// Take a token and return how long the caller has to wait for it.
    async fn reserve(&self) -> Duration {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        state.tokens = (state.tokens + elapsed * state.refill_rate).min(state.max_tokens);
        state.last_update = now;

        let jitter = state.min_delay + (state.max_delay - state.min_delay).mul_f64(rand_delay());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            jitter
        } else {
            // The deficit is carried, so concurrent waiters queue up behind
            // each other instead of all waking for the same token.
            let wait_time = (1.0 - state.tokens) / state.refill_rate;
            state.tokens -= 1.0;
            Duration::from_secs_f64(wait_time) + jitter
        }
    }
}

/// Generate a pseudo-random delay factor (0.0 - 1.0)
fn rand_delay() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_token_is_free() {
        let limiter = RateLimiter::new(60, 0.0, 0.0);
        assert_eq!(limiter.reserve().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_waiters_queue_behind_each_other() {
        let limiter = RateLimiter::new(60, 0.0, 0.0);
        limiter.reserve().await;
        let second = limiter.reserve().await;
        let third = limiter.reserve().await;
        assert!(second > Duration::from_millis(900), "{:?}", second);
        assert!(third > second + Duration::from_millis(900), "{:?}", third);
    }

    #[test]
    fn test_no_limiter_without_rate_cap() {
        let limits = CrawlLimits {
            max_concurrency: Some(2),
            max_requests_per_minute: None,
        };
        assert!(RateLimiter::from_limits(&limits).is_none());
    }

    #[test]
    fn test_rand_delay_in_unit_range() {
        let factor = rand_delay();
        assert!((0.0..1.0).contains(&factor));
    }
}
