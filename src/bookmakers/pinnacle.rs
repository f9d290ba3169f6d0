//! pinnacle.com
//!
//! The leagues page links to one page per league. A league page lists date
//! bars followed by the matchup rows for that date.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::filter::{self, Rule};
use super::listing::{enqueue_links, has_marker, LazyList, Pick, RowSpec};
use super::{Bookmaker, BookmakerId, HandlerContext};
use crate::config::CrawlLimits;
use crate::crawl::Label;
use crate::model::MarketField;
use crate::scraper::assembler::{EventProfile, IdentitySpec, MarketSpec};
use crate::scraper::dom::{ElementState, Locator, Page, Region, WaitState};
use crate::scraper::gate::Recovery;
use crate::scraper::parsers::{Cells, Keyword, MarketLocator, Reveal, Sections, Target};
use crate::scraper::text::squash;

const BASE_URL: &str = "https://www.pinnacle.com";
const START_URL: &str = "https://www.pinnacle.com/en/soccer/leagues";

const LEAGUE_LINKS: &str = "[data-test-id='Browse-Leagues'] .contentBlock:last-of-type li > div > a:first-of-type";
const TITLE: &str = "[data-test-id=Browse-Header] h1";
const NO_EVENTS: &str = ".noEvents";
/// The "matches" period; the default tab sometimes needs scrolling to render.
const MATCHES_TAB: &str = "button[id='period:0']";
const MATCHES_TAB_TIMEOUT: Duration = Duration::from_secs(10);

const ITEMS: &str = ".contentBlock.square > div[data-test-id='Events.DateBar'], \
                     .contentBlock.square > div[class*='style_row']";
const DATE_BAR: &str = "Events.DateBar";
const METADATA: &str = "div[class*='style_metadata']";

const PARTICIPANTS: &str = ".event-row-participant";
const MATCHUP_DATE: &str = "div[class*='style_matchupDate']";
const PRICE: &str = "span[class*='style_price']";
const LABEL: &str = "span[class*='style_label']";
const TEAM_NOISE: &[&str] = &["(Match)"];

const RULES: &[Rule] = &[Rule::Women, Rule::Youth];

const ROW: RowSpec = RowSpec {
    link: Pick::First("a"),
    home: Pick::Nth(PARTICIPANTS, 0),
    away: Pick::Nth(PARTICIPANTS, 1),
    date: None,
    time: Some(Pick::First(MATCHUP_DATE)),
    odds: PRICE,
    team_noise: TEAM_NOISE,
    strip_datetime_brackets: true,
};

pub struct Pinnacle;

/// Totals and handicaps start collapsed with only the main lines shown.
fn collapsed() -> Reveal {
    Reveal::expand().then_more("span", "See more")
}

#[async_trait]
impl Bookmaker for Pinnacle {
    fn id(&self) -> BookmakerId {
        BookmakerId::Pinnacle
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn start_urls(&self) -> Vec<String> {
        vec![START_URL.to_string()]
    }

    fn default_limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_concurrency: Some(5),
            max_requests_per_minute: Some(240),
        }
    }

    fn event_profile(&self) -> EventProfile {
        EventProfile {
            markets: MarketLocator::contains("div[data-test-id='Collapse']", "span"),
            beacon: Target::Named("Money Line – Match"),
            beacon_wait: WaitState::Visible,
            recovery: Recovery::reload(),
            identity: IdentitySpec {
                home: Locator::css(PARTICIPANTS).nth(0),
                away: Locator::css(PARTICIPANTS).nth(1),
                date: Locator::css(MATCHUP_DATE).first(),
                time: None,
                team_noise: TEAM_NOISE,
                strip_datetime_brackets: true,
            },
            tabs: None,
            specs: vec![
                MarketSpec::new(
                    MarketField::Outcome,
                    Target::Named("Money Line – Match"),
                    Cells::new("button span[class*='style_price']"),
                ),
                MarketSpec::new(
                    MarketField::Total,
                    Target::Named("Total – Match"),
                    Keyword::new(".market-btn", LABEL, PRICE),
                )
                .reveal(collapsed()),
                MarketSpec::new(
                    MarketField::Handicap,
                    Target::Named("Handicap – Match"),
                    Sections {
                        home: "div[class*='style_buttonRow'] > div:nth-child(1) > button",
                        away: "div[class*='style_buttonRow'] > div:nth-child(2) > button",
                        label: LABEL,
                        price: PRICE,
                    },
                )
                .reveal(collapsed()),
                MarketSpec::new(
                    MarketField::FirstHalfOutcome,
                    Target::Named("Money Line – 1st Half"),
                    Cells::new("button span[class*='style_price']"),
                )
                .reveal(Reveal::expand()),
            ],
        }
    }

    async fn handle_start(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        enqueue_links(page, LEAGUE_LINKS, BASE_URL, Label::Listing, cx).await;
        Ok(())
    }

    async fn handle_listing(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        let url = &cx.request.url;
        let title = match Region::root(page, TITLE).first().text(cx.timing.identity()).await {
            Ok(title) => squash(&title),
            Err(_) => {
                info!("No competition title on {}, it likely has no matches", url);
                return Ok(());
            }
        };
        if filter::skipped(&title, RULES, url) {
            return Ok(());
        }
        info!("Parsing competition {:?}", title);

        if let Ok(ElementState::Visible) = Region::root(page, NO_EVENTS).first().state().await {
            info!("Competition {:?} has no matches, skipping", title);
            return Ok(());
        }

        if let Err(e) = Region::root(page, MATCHES_TAB).first().click(MATCHES_TAB_TIMEOUT).await {
            info!("Could not open the matches tab of {:?}: {}", title, e);
        }
        tokio::time::sleep(cx.timing.settle()).await;

        let mut items = LazyList::new(Region::root(page, ITEMS));
        let mut date: Option<String> = None;
        while let Some(item) = items.next(cx.timing).await {
            if has_marker(&item, "data-test-id", DATE_BAR).await {
                date = match item.text(cx.timing.cell()).await {
                    Ok(text) => Some(squash(&text)),
                    Err(e) => {
                        debug!("Unreadable date bar: {}", e);
                        None
                    }
                };
                continue;
            }
            if item.locate(METADATA).count().await.unwrap_or(0) == 0 {
                debug!("Row {} is not a matchup", items.position());
                continue;
            }
            let record = ROW.read(&item, date.as_deref(), BASE_URL, url, cx.timing).await;
            cx.publish_or_skip(record).await?;
        }
        Ok(())
    }
}
