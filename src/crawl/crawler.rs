//! Worker pool driving one bookmaker's crawl.
//!
//! Each worker owns one page and claims requests from the shared queue until
//! the queue is drained and no other worker is still running a handler that
//! could enqueue more.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::queue::{Label, Next, Request, RequestQueue};
use super::CrawlStats;
use crate::bookmakers::{limits_for, Bookmaker, HandlerContext};
use crate::config::{CrawlConfig, CrawlLimits, Timing};
use crate::scraper::dom::Page;
use crate::scraper::{Browser, RateLimiter};
use crate::sink::Sink;

/// Poll interval for a worker waiting on in-flight requests.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Opens one page per worker.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Page>>;
}

#[async_trait]
impl PageSource for Browser {
    async fn open(&self) -> Result<Box<dyn Page>> {
        Ok(Box::new(self.new_page().await?))
    }
}

pub struct Crawler<'a> {
    bookmaker: &'a dyn Bookmaker,
    sink: &'a dyn Sink,
    timing: &'a Timing,
    crawl: &'a CrawlConfig,
    limits: CrawlLimits,
    limiter: Option<RateLimiter>,
    queue: RequestQueue,
    stats: CrawlStats,
}

impl<'a> Crawler<'a> {
    pub fn new(bookmaker: &'a dyn Bookmaker, sink: &'a dyn Sink, timing: &'a Timing, crawl: &'a CrawlConfig) -> Self {
        let limits = limits_for(bookmaker, crawl);
        Self {
            bookmaker,
            sink,
            timing,
            crawl,
            limiter: RateLimiter::from_limits(&limits),
            limits,
            queue: RequestQueue::new(),
            stats: CrawlStats::default(),
        }
    }

    /// Queue a request before the run starts.
    pub fn seed(&self, url: &str, label: Label) {
        self.queue.add(url, label, false);
    }

    pub fn seed_start_urls(&self) {
        for url in self.bookmaker.start_urls() {
            self.seed(&url, Label::Start);
        }
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    fn concurrency(&self) -> usize {
        self.limits.max_concurrency.unwrap_or(1).max(1)
    }

    /// Run until the queue is drained. Handler failures are counted and
    /// logged. Only failing to open the worker pages aborts the run.
    pub async fn run(&self, source: &dyn PageSource) -> Result<()> {
        let workers = self.concurrency();
        let queue_name = self.bookmaker.id().queue();
        info!(
            "Crawling {} with {} workers ({} requests queued, {:?} per minute)",
            queue_name,
            workers,
            self.queue.len(),
            self.limits.max_requests_per_minute
        );

        let pages = try_join_all((0..workers).map(|_| source.open()))
            .await
            .context("Failed to open worker pages")?;
        if let Some((width, height)) = self.bookmaker.viewport() {
            for page in &pages {
                page.set_viewport(width, height)
                    .await
                    .context("Failed to resize worker page")?;
            }
        }

        join_all(pages.iter().enumerate().map(|(id, page)| self.worker(id, page.as_ref()))).await;

        self.stats.log_summary(queue_name);
        Ok(())
    }

    async fn worker(&self, id: usize, page: &dyn Page) {
        loop {
            let request = match self.queue.next() {
                Next::Run(request) => request,
                Next::Wait => {
                    tokio::time::sleep(IDLE_POLL).await;
                    continue;
                }
                Next::Drained => break,
            };

            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            debug!("Worker {} opening {} ({})", id, request.url, request.label);
            if let Err(e) = self.process(page, &request).await {
                self.stats.failed();
                warn!("Request {} ({}) failed: {:#}", request.url, request.label, e);
            }
            self.queue.finish();
        }
        debug!("Worker {} finished", id);
    }

    async fn process(&self, page: &dyn Page, request: &Request) -> Result<()> {
        page.goto(&request.url)
            .await
            .with_context(|| format!("Failed to open {}", request.url))?;

        let cx = HandlerContext {
            request,
            queue: self.bookmaker.id().queue(),
            dispatcher: &self.queue,
            sink: self.sink,
            timing: self.timing,
            crawl: self.crawl,
            stats: &self.stats,
        };
        let timeout = self.crawl.request_timeout();
        tokio::time::timeout(timeout, self.bookmaker.handle(page, &cx))
            .await
            .map_err(|_| anyhow!("handler timed out after {:?}", timeout))?
    }
}
