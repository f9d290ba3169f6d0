//! Odds scraper
//!
//! Headless-browser crawler that extracts football match odds from
//! bookmaker pages and pushes one JSON record per event to Redis.

mod bookmakers;
mod cli;
mod config;
mod crawl;
mod model;
mod normalize;
mod retry;
mod scraper;
mod sink;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    config.logging.init();
    tracing::debug!("Configuration loaded");

    match cli.command {
        Commands::Crawl {
            bookmaker,
            dry_run,
            urls,
            events,
        } => cli::run_crawl(&config, bookmaker, dry_run, urls, events).await,
        Commands::Parse {
            bookmaker,
            file,
            url,
            listing,
        } => cli::run_parse(&config, bookmaker, file, url, listing).await,
        Commands::Bookmakers => {
            cli::run_bookmakers();
            Ok(())
        }
    }
}
