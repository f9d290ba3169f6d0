//! CLI commands for odds-scraper.
//!
//! Runs live crawls against one bookmaker and replays saved pages offline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::bookmakers::{handle_event, BookmakerId, HandlerContext};
use crate::config::AppConfig;
use crate::crawl::{CrawlStats, Crawler, Label, Request, RequestQueue};
use crate::scraper::snapshot::SnapshotPage;
use crate::scraper::Browser;
use crate::sink::{MemorySink, RedisSink, Sink};

#[derive(Parser)]
#[command(name = "odds-scraper")]
#[command(version, about = "Odds scraper: bookmaker match and market extraction", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl one bookmaker and push records to its Redis queue
    Crawl {
        /// Bookmaker to crawl
        #[arg(value_enum)]
        bookmaker: BookmakerId,

        /// Keep records in memory and print them instead of pushing to Redis
        #[arg(long)]
        dry_run: bool,

        /// Start pages to use instead of the bookmaker's defaults
        #[arg(long = "url", value_name = "URL")]
        urls: Vec<String>,

        /// Event pages to assemble directly
        #[arg(long = "event", value_name = "URL")]
        events: Vec<String>,
    },

    /// Parse a saved page and print the records it yields
    Parse {
        /// Bookmaker whose layout the page uses
        #[arg(value_enum)]
        bookmaker: BookmakerId,

        /// Saved HTML file
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// URL the page was saved from
        #[arg(short, long)]
        url: String,

        /// Treat the page as a listing instead of an event page
        #[arg(long)]
        listing: bool,
    },

    /// List supported bookmakers and their queue names
    Bookmakers,
}

/// Run a live crawl.
pub async fn run_crawl(
    config: &AppConfig,
    bookmaker: BookmakerId,
    dry_run: bool,
    urls: Vec<String>,
    events: Vec<String>,
) -> Result<()> {
    if dry_run {
        let sink = MemorySink::new();
        crawl_into(config, bookmaker, &sink, &urls, &events).await?;
        print_queue(&sink, bookmaker.queue());
        return Ok(());
    }

    let sink = RedisSink::connect(&config.redis).await?;
    let result = crawl_into(config, bookmaker, &sink, &urls, &events).await;
    sink.close().await;
    result
}

async fn crawl_into(
    config: &AppConfig,
    bookmaker: BookmakerId,
    sink: &dyn Sink,
    urls: &[String],
    events: &[String],
) -> Result<()> {
    let adapter = bookmaker.adapter();
    let crawler = Crawler::new(adapter.as_ref(), sink, &config.timing, &config.crawl);

    // Explicit URLs of either kind replace the default start pages.
    if urls.is_empty() && events.is_empty() {
        crawler.seed_start_urls();
    }
    for url in urls {
        crawler.seed(url, Label::Start);
    }
    for url in events {
        crawler.seed(url, Label::Event);
    }

    let browser = Browser::launch(&config.browser).await?;
    let result = crawler.run(&browser).await;
    browser.close().await?;
    result
}

/// Replay a saved page through the snapshot backend.
pub async fn run_parse(config: &AppConfig, bookmaker: BookmakerId, file: PathBuf, url: String, listing: bool) -> Result<()> {
    let html = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
    let page = SnapshotPage::new(url.as_str(), html);
    let adapter = bookmaker.adapter();

    let request = Request {
        url,
        label: if listing { Label::Listing } else { Label::Event },
    };
    let queue = RequestQueue::new();
    let sink = MemorySink::new();
    let stats = CrawlStats::default();
    let cx = HandlerContext {
        request: &request,
        queue: bookmaker.queue(),
        dispatcher: &queue,
        sink: &sink,
        timing: &config.timing,
        crawl: &config.crawl,
        stats: &stats,
    };

    if listing {
        adapter.handle_listing(&page, &cx).await?;
    } else {
        handle_event(&adapter.event_profile(), &page, &cx).await?;
    }

    print_queue(&sink, bookmaker.queue());
    while let Some(next) = queue.pop() {
        info!("Would follow {} ({})", next.url, next.label);
    }
    stats.log_summary(bookmaker.queue());
    Ok(())
}

pub fn run_bookmakers() {
    for id in BookmakerId::ALL {
        let adapter = id.adapter();
        println!("{:<10} queue={:<10} start={}", id, id.queue(), adapter.start_urls().join(", "));
    }
}

fn print_queue(sink: &MemorySink, queue: &str) {
    for payload in sink.items(queue) {
        println!("{}", payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_crawl_args() {
        let cli = Cli::try_parse_from([
            "odds-scraper",
            "crawl",
            "pinnacle",
            "--dry-run",
            "--event",
            "https://www.pinnacle.com/en/soccer/a/b/1",
        ])
        .unwrap();
        match cli.command {
            Commands::Crawl {
                bookmaker,
                dry_run,
                urls,
                events,
            } => {
                assert_eq!(bookmaker, BookmakerId::Pinnacle);
                assert!(dry_run);
                assert!(urls.is_empty());
                assert_eq!(events.len(), 1);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_unknown_bookmaker_rejected() {
        assert!(Cli::try_parse_from(["odds-scraper", "crawl", "bet365"]).is_err());
    }

    #[tokio::test]
    async fn test_parse_saved_event_page() {
        let dir = std::env::temp_dir().join(format!("odds-scraper-parse-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("event.html");
        std::fs::write(
            &file,
            r#"<html><body>
            <div class="line-champ__date">14.10.2026</div>
            <span class="line-event__time-static">18:00</span>
            <span class="line-event__name-teams"><b>Arsenal</b> - <b>Chelsea</b></span>
            <div class="line-event__main-bets"><button>1.90</button><button>3.40</button><button>4.10</button></div>
            </body></html>"#,
        )
        .unwrap();

        let config = AppConfig {
            timing: crate::config::Timing::fast(),
            ..AppConfig::default()
        };
        let result = run_parse(
            &config,
            BookmakerId::Betcity,
            file.clone(),
            "https://betcity.ru/ru/line/soccer/1/101".to_string(),
            false,
        )
        .await;
        std::fs::remove_dir_all(&dir).ok();
        result.unwrap();
    }
}
