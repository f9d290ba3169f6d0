//! fon.bet
//!
//! The football page is one virtual list where competition headers and
//! event rows are siblings. Rows are only rendered near the viewport, so the
//! list is walked item by item while scrolling. Every named event is queued
//! for the full event page parse.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::filter::{self, Rule};
use super::listing::{absolute_url, has_marker, LazyList};
use super::{Bookmaker, BookmakerId, HandlerContext};
use crate::config::CrawlLimits;
use crate::crawl::Label;
use crate::model::MarketField;
use crate::scraper::assembler::{EventProfile, IdentitySpec, MarketSpec};
use crate::scraper::dom::{Locator, Page, Region, WaitState};
use crate::scraper::gate::{await_ready, Recovery};
use crate::scraper::parsers::{Cells, Columns, Group, MarketLocator, Sections, Target};
use crate::scraper::text::squash;

const BASE_URL: &str = "https://fon.bet";
const START_URL: &str = "https://www.fon.bet/sports/football/?mode=1";

const ITEMS: &str = "div[class*='sport-section-virtual-list--'] > [class*='sport-competition--'], \
                     div[class*='sport-section-virtual-list--'] > div[class*='sport-base-event--']";
const COMPETITION_CLASS: &str = "sport-competition--";
const COMPETITION_NAME: &str = "[class*='table-component-text--']";
const EVENT_NAME: &str = "a[class*='sport-event__name--']";
/// Rows without a rendered name link are specials, not matches.
const EVENT_NAME_TIMEOUT: Duration = Duration::from_millis(200);

const RULES: &[Rule] = &[Rule::WomenPrefix("wom."), Rule::Youth];

const OUTCOME_CELLS: &str = "div[class*='cell-wrap'] div[class*='value-state-normal']";

pub struct Fonbet;

/// Open the language menu and pick English.
fn language_switch() -> Vec<Locator> {
    vec![
        Locator::css(".js-header-languages .header__link").first(),
        Locator::css(".js-header-languages *").with_text("English").first(),
    ]
}

impl Fonbet {
    async fn walk_competitions(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        let items = Region::root(page, ITEMS);
        let mut list = LazyList::new(items).scrolling(cx.crawl.max_scroll_rounds, cx.scroll_pause());

        // Rows before the first header belong to no competition.
        let mut skipping = true;
        let mut queued = 0usize;
        while let Some(item) = list.next(cx.timing).await {
            if has_marker(&item, "class", COMPETITION_CLASS).await {
                skipping = match item.locate(COMPETITION_NAME).first().text(cx.timing.identity()).await {
                    Ok(name) => {
                        let name = squash(&name);
                        let skip = filter::skipped(&name, RULES, &cx.request.url);
                        if !skip {
                            info!("Reading competition {}", name);
                        }
                        skip
                    }
                    Err(e) => {
                        debug!("Competition header without a name: {}", e);
                        true
                    }
                };
                continue;
            }
            if skipping {
                continue;
            }

            let name = item.locate(EVENT_NAME).first();
            if !await_ready(&name, WaitState::Visible, EVENT_NAME_TIMEOUT).await.is_ready() {
                debug!("Event row {} has no name, skipping", list.position());
                continue;
            }
            match item.locate("a").first().attribute("href", cx.timing.cell()).await {
                Ok(Some(href)) => match absolute_url(BASE_URL, &href) {
                    Some(url) => {
                        cx.follow(&url, Label::Event).await;
                        queued += 1;
                    }
                    None => debug!("Unusable event href {:?}", href),
                },
                Ok(None) => debug!("Event row {} has no href", list.position()),
                Err(e) => debug!("Event row {} link unreadable: {}", list.position(), e),
            }
        }

        info!("Queued {} events from {}", queued, cx.request.url);
        Ok(())
    }
}

#[async_trait]
impl Bookmaker for Fonbet {
    fn id(&self) -> BookmakerId {
        BookmakerId::Fonbet
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn start_urls(&self) -> Vec<String> {
        vec![START_URL.to_string()]
    }

    fn viewport(&self) -> Option<(u32, u32)> {
        Some((1280, 3500))
    }

    fn default_limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_concurrency: Some(5),
            max_requests_per_minute: Some(240),
        }
    }

    fn event_profile(&self) -> EventProfile {
        EventProfile {
            markets: MarketLocator::contains("div[class*='market-group-box']", "div"),
            beacon: Target::Named("Result"),
            beacon_wait: WaitState::Visible,
            recovery: language_switch()
                .into_iter()
                .fold(Recovery::reload(), Recovery::then_click),
            identity: IdentitySpec {
                home: Locator::css("div[class*='ev-team-'] span").nth(0),
                away: Locator::css("div[class*='ev-team-'] span").nth(1),
                date: Locator::css("[class*='ev-line-time__day']").first(),
                time: Some(Locator::css("[class*='ev-line-time__time']").first()),
                team_noise: &[],
                strip_datetime_brackets: false,
            },
            tabs: Some("div[class*='tab']"),
            specs: vec![
                MarketSpec::new(MarketField::Outcome, Target::Named("Result"), Cells::new(OUTCOME_CELLS)),
                MarketSpec::new(
                    MarketField::Total,
                    Target::Named("Total goals"),
                    Columns::new(
                        "div[class*='row-common']",
                        "div[class*='cell-wrap']:not([class*='separator'])",
                        vec![
                            Group {
                                line: 0,
                                over: 1,
                                under: 2,
                            },
                            Group {
                                line: 3,
                                over: 4,
                                under: 5,
                            },
                        ],
                    ),
                ),
                MarketSpec::new(
                    MarketField::Handicap,
                    Target::Named("Handicap"),
                    Sections {
                        home: "div[class*='body'] > div:nth-child(1) div[class*='row-common']",
                        away: "div[class*='body'] > div:nth-child(2) div[class*='row-common']",
                        label: "div[class*='common-text']",
                        price: "div[class*='factor-td']",
                    },
                ),
                MarketSpec::new(
                    MarketField::FirstHalfOutcome,
                    Target::Named("Result in 1st half"),
                    Cells::new(OUTCOME_CELLS),
                )
                .on_tab("1st half"),
            ],
        }
    }

    async fn handle_start(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        Recovery::clicks(language_switch()).run(page, cx.timing).await;
        self.walk_competitions(page, cx).await
    }

    async fn handle_listing(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        self.walk_competitions(page, cx).await
    }
}
