//! Backoff for the start-up dependencies: Chrome and Redis.
//!
//! Each attempt classifies its own failure. Transient ones (a refused or
//! dropped connection, a slow browser start) are retried on the configured
//! schedule; permanent ones (a malformed URL, a bad browser config) return
//! immediately.

use anyhow::Error;
use redis::RedisError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Backoff;

/// A failed attempt.
#[derive(Debug)]
pub enum Failure {
    Transient(Error),
    Permanent(Error),
}

impl Failure {
    pub fn transient(e: impl Into<Error>) -> Self {
        Failure::Transient(e.into())
    }

    pub fn permanent(e: impl Into<Error>) -> Self {
        Failure::Permanent(e.into())
    }

    fn into_error(self) -> Error {
        match self {
            Failure::Transient(e) | Failure::Permanent(e) => e,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Transient(e) => write!(f, "{:#}", e),
            Failure::Permanent(e) => write!(f, "{:#} (not retried)", e),
        }
    }
}

/// Connection-level Redis errors are worth another attempt; protocol,
/// auth and config errors are not.
pub fn redis_failure(e: RedisError) -> Failure {
    let transient = e.is_connection_refusal()
        || e.is_connection_dropped()
        || e.is_timeout()
        || e.is_io_error()
        || matches!(e.kind(), redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain);
    if transient {
        Failure::transient(e)
    } else {
        Failure::permanent(e)
    }
}

impl Backoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay().saturating_mul(factor).min(self.max_delay())
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the retries in
/// `backoff` are spent. The last error is returned.
pub async fn with_backoff<T, F, Fut>(backoff: &Backoff, what: &str, mut attempt: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("{} succeeded after {} retries", what, retries);
                }
                return Ok(value);
            }
            Err(Failure::Transient(e)) if retries < backoff.max_retries => {
                let delay = backoff.delay_for_attempt(retries);
                retries += 1;
                warn!(
                    "{} failed (attempt {}/{}): {:#}. Retrying in {:?}",
                    what,
                    retries,
                    backoff.max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
            }
            Err(failure) => {
                warn!("{} failed: {}", what, failure);
                return Err(failure.into_error());
            }
        }
    }
}
