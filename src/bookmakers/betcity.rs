//! betcity.ru
//!
//! The line page opens in Russian behind a push-notification prompt. After
//! switching to English it links to one page per championship, and each
//! championship page lists date separators followed by match rows.

use anyhow::{Context, Result};
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
use crate::scraper::dom::{Locator, Page, Region, WaitState};
use crate::scraper::gate::{await_ready, Recovery};
use crate::scraper::parsers::{Cells, Columns, Group, MarketLocator, Target};
use crate::scraper::text::squash;

const BASE_URL: &str = "https://betcity.ru";
const START_URL: &str = "https://betcity.ru/ru/line/soccer";

const LANGUAGE_SWITCHER: &str = "app-language-switcher";
const LANGUAGE_TIMEOUT: Duration = Duration::from_millis(3500);
const CHAMPIONSHIPS: &str = ".champs-container__item:first-of-type a.champs__champ-name";

const ITEMS: &str = ".line__champ .line-champ__date, .line__champ app-line-event-unit";
const DATE_CLASS: &str = "line-champ__date";
const MAIN_BETS: &str = ".line-event__main-bets";

const RULES: &[Rule] = &[Rule::Statistics, Rule::Women, Rule::Youth];

const ROW: RowSpec = RowSpec {
    link: Pick::First("a.line-event__name"),
    home: Pick::First(".line-event__name-teams b:first-child"),
    away: Pick::First(".line-event__name-teams b:last-child"),
    date: None,
    time: Some(Pick::First(".line-event__time-static")),
    odds: ".line-event__main-bets button",
    team_noise: &[],
    strip_datetime_brackets: false,
};

pub struct Betcity;

/// Language menu, the English entry, then the push prompt's dismiss button.
fn first_visit() -> Vec<Locator> {
    vec![
        Locator::css(LANGUAGE_SWITCHER).first(),
        Locator::css("app-language-switcher .custom-select-popup-item:last-child").first(),
        Locator::css("div.push-confirm .push-confirm__button:first-of-type").first(),
    ]
}

#[async_trait]
impl Bookmaker for Betcity {
    fn id(&self) -> BookmakerId {
        BookmakerId::Betcity
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn start_urls(&self) -> Vec<String> {
        vec![START_URL.to_string()]
    }

    fn default_limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_concurrency: Some(3),
            max_requests_per_minute: Some(120),
        }
    }

    fn event_profile(&self) -> EventProfile {
        EventProfile {
            markets: MarketLocator::exact("div.dops-item", "span"),
            beacon: Target::fixed(MAIN_BETS),
            beacon_wait: WaitState::Visible,
            recovery: Recovery::reload(),
            identity: IdentitySpec {
                home: Locator::css(".line-event__name-teams b").first(),
                away: Locator::css(".line-event__name-teams b").last(),
                date: Locator::css(".line-champ__date").first(),
                time: Some(Locator::css(".line-event__time-static").first()),
                team_noise: &[],
                strip_datetime_brackets: false,
            },
            tabs: None,
            specs: vec![
                MarketSpec::new(MarketField::Outcome, Target::fixed(MAIN_BETS), Cells::new("button")),
                MarketSpec::new(
                    MarketField::Total,
                    Target::Named("Total"),
                    Columns::new(
                        ".dops-item-row__section",
                        ".dops-item-row__block",
                        vec![Group {
                            line: 0,
                            under: 1,
                            over: 2,
                        }],
                    ),
                ),
            ],
        }
    }

    async fn handle_start(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        let switcher = Region::root(page, LANGUAGE_SWITCHER).first();
        if !await_ready(&switcher, WaitState::Visible, LANGUAGE_TIMEOUT).await.is_ready() {
            info!("Language switcher missing on {}", cx.request.url);
        }
        Recovery::clicks(first_visit()).run(page, cx.timing).await;

        enqueue_links(page, CHAMPIONSHIPS, BASE_URL, Label::Listing, cx).await;
        Ok(())
    }

    async fn handle_listing(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        let url = &cx.request.url;
        let title = page.title().await.context("Failed to read page title")?;
        if filter::skipped(&title, RULES, url) {
            return Ok(());
        }
        info!("Parsing page {}", squash(&title));

        let items = Region::root(page, ITEMS);
        if !await_ready(&items.first(), WaitState::Visible, cx.timing.primary()).await.is_ready() {
            info!("No matches listed on {}", url);
            return Ok(());
        }

        let mut list = LazyList::new(items);
        let mut date: Option<String> = None;
        while let Some(item) = list.next(cx.timing).await {
            if has_marker(&item, "class", DATE_CLASS).await {
                date = match item.text(cx.timing.cell()).await {
                    Ok(text) => Some(squash(&text)),
                    Err(e) => {
                        debug!("Unreadable date separator: {}", e);
                        None
                    }
                };
                continue;
            }
            let record = ROW.read(&item, date.as_deref(), BASE_URL, url, cx.timing).await;
            cx.publish_or_skip(record).await?;
        }
        Ok(())
    }
}
