//! Bookmaker adapters: start pages, listing walks and event page profiles.

pub mod betcity;
pub mod filter;
pub mod fonbet;
pub mod listing;
pub mod marathon;
pub mod pinnacle;

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::config::{CrawlConfig, CrawlLimits, Timing};
use crate::crawl::{CrawlStats, Dispatcher, Label, Request};
use crate::model::MatchRecord;
use crate::normalize::Normalize;
use crate::scraper::assembler::{assemble_event, EventError, EventProfile};
use crate::scraper::dom::Page;
use crate::sink::Sink;

/// Supported bookmakers. The name doubles as the output queue name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum BookmakerId {
    Betcity,
    Fonbet,
    Marathon,
    Pinnacle,
}

impl BookmakerId {
    pub const ALL: [BookmakerId; 4] = [
        BookmakerId::Betcity,
        BookmakerId::Fonbet,
        BookmakerId::Marathon,
        BookmakerId::Pinnacle,
    ];

    pub fn queue(self) -> &'static str {
        match self {
            BookmakerId::Betcity => "betcity",
            BookmakerId::Fonbet => "fonbet",
            BookmakerId::Marathon => "marathon",
            BookmakerId::Pinnacle => "pinnacle",
        }
    }

    pub fn adapter(self) -> Box<dyn Bookmaker> {
        match self {
            BookmakerId::Betcity => Box::new(betcity::Betcity),
            BookmakerId::Fonbet => Box::new(fonbet::Fonbet),
            BookmakerId::Marathon => Box::new(marathon::Marathon),
            BookmakerId::Pinnacle => Box::new(pinnacle::Pinnacle),
        }
    }
}

impl fmt::Display for BookmakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue())
    }
}

/// What a handler gets to work with besides the page.
pub struct HandlerContext<'a> {
    pub request: &'a Request,
    pub queue: &'static str,
    pub dispatcher: &'a dyn Dispatcher,
    pub sink: &'a dyn Sink,
    pub timing: &'a Timing,
    pub crawl: &'a CrawlConfig,
    pub stats: &'a CrawlStats,
}

impl HandlerContext<'_> {
    /// Normalize a record and hand it to the sink. The record is consumed.
    pub async fn publish(&self, record: MatchRecord) -> Result<()> {
        let record = record.normalize();
        let payload = record.to_json()?;
        self.sink.push(self.queue, payload).await?;
        self.stats.published();
        info!("Published {} ({})", record.name, record.event_url);
        Ok(())
    }

    /// Record a skipped event or row.
    pub fn skip(&self, err: &EventError) {
        self.stats.skipped();
        info!("Skipping on {}: {}", self.request.url, err);
    }

    /// Publish a finished record, or log why there is none.
    pub async fn publish_or_skip(&self, record: Result<MatchRecord, EventError>) -> Result<()> {
        match record {
            Ok(record) => self.publish(record).await,
            Err(e) => {
                self.skip(&e);
                Ok(())
            }
        }
    }

    pub async fn follow(&self, url: &str, label: Label) {
        self.dispatcher.enqueue(url, label, false).await;
    }

    pub fn scroll_pause(&self) -> Duration {
        self.crawl.scroll_pause()
    }
}

/// One bookmaker's crawl behaviour.
#[async_trait]
pub trait Bookmaker: Send + Sync {
    fn id(&self) -> BookmakerId;

    fn base_url(&self) -> &'static str;

    fn start_urls(&self) -> Vec<String>;

    /// Window size for lazily-loaded pages that render more when taller.
    fn viewport(&self) -> Option<(u32, u32)> {
        None
    }

    /// Concurrency and rate limits used unless the config overrides them.
    fn default_limits(&self) -> CrawlLimits;

    /// How to read this bookmaker's event pages.
    fn event_profile(&self) -> EventProfile;

    /// Entry page: discover listing or event pages.
    async fn handle_start(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()>;

    /// Competition page.
    async fn handle_listing(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()>;

    /// Route a request to its handler.
    async fn handle(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        match cx.request.label {
            Label::Start => self.handle_start(page, cx).await,
            Label::Listing => self.handle_listing(page, cx).await,
            Label::Event => handle_event(&self.event_profile(), page, cx).await,
        }
    }
}

/// Assemble and publish the event open on `page`.
pub async fn handle_event(profile: &EventProfile, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
    cx.publish_or_skip(assemble_event(page, profile, cx.timing).await).await
}

/// Effective limits for a bookmaker: config overrides on top of its defaults.
pub fn limits_for(bookmaker: &dyn Bookmaker, crawl: &CrawlConfig) -> CrawlLimits {
    let defaults = bookmaker.default_limits();
    match crawl.limits.get(bookmaker.id().queue()) {
        Some(overrides) => CrawlLimits {
            max_concurrency: overrides.max_concurrency.or(defaults.max_concurrency),
            max_requests_per_minute: overrides.max_requests_per_minute.or(defaults.max_requests_per_minute),
        },
        None => defaults,
    }
}
