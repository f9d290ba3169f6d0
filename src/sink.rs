//! Output queues, one append-only list per bookmaker.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::{Backoff, RedisConfig};
use crate::retry::{redis_failure, with_backoff, Failure};

/// Append-only list store keyed by queue name.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Append one JSON payload to `queue`.
    async fn push(&self, queue: &str, payload: String) -> Result<()>;
}

/// Redis lists written with `RPUSH`.
pub struct RedisSink {
    manager: ConnectionManager,
    retry: Backoff,
}

impl RedisSink {
    /// Connect with retry. Call once before the crawl.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let url = config.url();
        let client = redis::Client::open(url.as_str()).context("Invalid Redis URL")?;
        let manager = with_backoff(&config.retry, "redis connect", || {
            let client = client.clone();
            async move { ConnectionManager::new(client).await.map_err(redis_failure) }
        })
        .await
        .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}:{}/{}", config.host, config.port, config.db);
        Ok(Self {
            manager,
            retry: config.retry.clone(),
        })
    }

    /// Release the connection after the crawl.
    pub async fn close(self) {
        drop(self.manager);
        info!("Redis connection closed");
    }
}

#[async_trait]
impl Sink for RedisSink {
    /// A refused connection means nothing was written, so only that case is
    /// retried; anything else could duplicate the record.
    async fn push(&self, queue: &str, payload: String) -> Result<()> {
        let len: i64 = with_backoff(&self.retry, "redis push", || {
            let mut conn = self.manager.clone();
            let payload = payload.clone();
            async move {
                conn.rpush::<_, _, i64>(queue, payload).await.map_err(|e: RedisError| {
                    if e.is_connection_refusal() {
                        Failure::transient(e)
                    } else {
                        Failure::permanent(e)
                    }
                })
            }
        })
        .await
        .with_context(|| format!("RPUSH to {} failed", queue))?;
        debug!("Queue {} now holds {} records", queue, len);
        Ok(())
    }
}

/// In-process sink for tests and dry runs.
#[derive(Default)]
pub struct MemorySink {
    queues: Mutex<HashMap<String, Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads pushed to `queue`, in order.
    pub fn items(&self, queue: &str) -> Vec<String> {
        self.queues.lock().get(queue).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.queues.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn push(&self, queue: &str, payload: String) -> Result<()> {
        self.queues.lock().entry(queue.to_string()).or_default().push(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_sink_keeps_order_per_queue() {
        let sink = MemorySink::new();
        sink.push("fonbet", "{\"a\":1}".to_string()).await.unwrap();
        sink.push("pinnacle", "{\"b\":2}".to_string()).await.unwrap();
        sink.push("fonbet", "{\"a\":3}".to_string()).await.unwrap();
        assert_eq!(sink.items("fonbet"), vec!["{\"a\":1}", "{\"a\":3}"]);
        assert_eq!(sink.len(), 3);
        assert!(sink.items("betcity").is_empty());
    }

    #[tokio::test]
    async fn test_connect_gives_up_when_nothing_listens() {
        let config = RedisConfig {
            port: 1,
            retry: Backoff {
                max_retries: 1,
                initial_delay_ms: 1,
                max_delay_ms: 1,
            },
            ..RedisConfig::default()
        };
        let err = RedisSink::connect(&config).await.err().unwrap();
        assert!(err.to_string().contains("Failed to connect to Redis"));
    }

    #[tokio::test]
    async fn test_memory_sink_concurrent_pushes() {
        let sink = Arc::new(MemorySink::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                sink.push("marathon", i.to_string()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(sink.items("marathon").len(), 8);
    }
}
