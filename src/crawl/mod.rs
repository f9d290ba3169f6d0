//! Crawl layer: request queue, worker pool and run statistics.

pub mod crawler;
pub mod queue;

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

pub use crawler::Crawler;
pub use queue::{Dispatcher, Label, Request, RequestQueue};

/// Counters shared by every worker of one run.
#[derive(Debug, Default)]
pub struct CrawlStats {
    published: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl CrawlStats {
    pub fn published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A request whose handler errored or timed out.
    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self, queue: &str) {
        info!(
            "{} crawl finished: {} published, {} skipped, {} failed",
            queue,
            self.published_count(),
            self.skipped_count(),
            self.failed_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_count_independently() {
        let stats = CrawlStats::default();
        stats.published();
        stats.published();
        stats.skipped();
        assert_eq!(stats.published_count(), 2);
        assert_eq!(stats.skipped_count(), 1);
        assert_eq!(stats.failed_count(), 0);
    }
}
