//! marathonbet.com
//!
//! The football page renders categories lazily as the window scrolls. Each
//! category row already carries the headline prices, so rows are published
//! straight from the listing.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use super::filter::{self, Rule};
use super::listing::{LazyList, Pick, RowSpec};
use super::{Bookmaker, BookmakerId, HandlerContext};
use crate::config::CrawlLimits;
use crate::model::MarketField;
use crate::scraper::assembler::{EventProfile, IdentitySpec, MarketSpec};
use crate::scraper::dom::{Locator, Page, Region, WaitState};
use crate::scraper::gate::Recovery;
use crate::scraper::parsers::{Alternating, Cells, MarketLocator, RowPairs, Target};
use crate::scraper::text::squash;

const BASE_URL: &str = "https://www.marathonbet.com";
const START_URL: &str = "https://www.marathonbet.com/en/betting/Football+-+11";

const CATEGORIES: &str = "div[class='category-container']";
const CATEGORY_NAME: &str = "h2[class*='category-label']";
const ROWS: &str = "div[class*='foot-market'] > div[class*='coupon-row']";
const MEMBERS: &str = "table[class*='member-area-content-table'] a[class='member-link']";
const DATE: &str = "table[class*='member-area-content-table'] td[class*='date']";
const HEADLINE: &str = ".coupon-row table.coupon-row-item";

const RULES: &[Rule] = &[Rule::WomenPrefix("women."), Rule::Outright];

/// A category row; the home team link doubles as the event link.
const ROW: RowSpec = RowSpec {
    link: Pick::Nth(MEMBERS, 0),
    home: Pick::Nth(MEMBERS, 0),
    away: Pick::Nth(MEMBERS, 1),
    date: Some(Pick::First(DATE)),
    time: None,
    odds: "td[class*='price']",
    team_noise: &[],
    strip_datetime_brackets: false,
};

pub struct Marathon;

impl Marathon {
    async fn walk_categories(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        let categories = Region::root(page, CATEGORIES);
        let mut list = LazyList::new(categories).scrolling(cx.crawl.max_scroll_rounds, cx.scroll_pause());

        while let Some(category) = list.next(cx.timing).await {
            let name = match category.locate(CATEGORY_NAME).first().text(cx.timing.identity()).await {
                Ok(name) => squash(&name),
                Err(e) => {
                    debug!("Category {} has no name: {}", list.position(), e);
                    continue;
                }
            };
            if filter::skipped(&name, RULES, &cx.request.url) {
                continue;
            }

            let rows = category.locate(ROWS);
            let count = rows.count().await.unwrap_or(0);
            info!("There are {} events in {}", count, name);
            for i in 0..count {
                let record = ROW
                    .read(&rows.nth(i), None, BASE_URL, &cx.request.url, cx.timing)
                    .await;
                cx.publish_or_skip(record).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Bookmaker for Marathon {
    fn id(&self) -> BookmakerId {
        BookmakerId::Marathon
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn start_urls(&self) -> Vec<String> {
        vec![START_URL.to_string()]
    }

    fn viewport(&self) -> Option<(u32, u32)> {
        Some((1280, 9000))
    }

    fn default_limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_concurrency: Some(3),
            max_requests_per_minute: Some(120),
        }
    }

    /// Markets below the headline row stay in the DOM on closed tabs, so
    /// they only need to be attached.
    fn event_profile(&self) -> EventProfile {
        EventProfile {
            markets: MarketLocator::contains(
                "div[class='market-inline-block-table-wrapper']",
                "div[class='name-field']",
            ),
            beacon: Target::fixed(HEADLINE),
            beacon_wait: WaitState::Visible,
            recovery: Recovery::reload(),
            identity: IdentitySpec {
                home: Locator::css(MEMBERS).nth(0),
                away: Locator::css(MEMBERS).nth(1),
                date: Locator::css(DATE).first(),
                time: None,
                team_noise: &[],
                strip_datetime_brackets: false,
            },
            tabs: None,
            specs: vec![
                MarketSpec::new(MarketField::Outcome, Target::fixed(HEADLINE), Cells::new(".price")),
                // The padding keeps "Total Goals" from matching team totals.
                MarketSpec::new(
                    MarketField::Total,
                    Target::Named("  Total Goals    "),
                    Alternating::new("td[class*='price']", ".coeff-value", ".coeff-price"),
                )
                .attached(),
                MarketSpec::new(
                    MarketField::Handicap,
                    Target::Named("To Win Match With Handicap"),
                    RowPairs {
                        rows: "tr",
                        cells: "td[class*='price']",
                        label: "div.coeff-value",
                        price: "div.coeff-price",
                    },
                )
                .attached(),
                MarketSpec::new(
                    MarketField::FirstHalfOutcome,
                    Target::Named("1st Half Result  "),
                    Cells::new("td[class*='price'] span"),
                )
                .attached(),
            ],
        }
    }

    async fn handle_start(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        self.walk_categories(page, cx).await
    }

    async fn handle_listing(&self, page: &dyn Page, cx: &HandlerContext<'_>) -> Result<()> {
        self.walk_categories(page, cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmakers::testing::Harness;
    use crate::crawl::Label;
    use crate::scraper::snapshot::SnapshotPage;
    use serde_json::Value;

    const LISTING: &str = r#"<html><body>
        <div class="category-container"><h2 class="category-label">England. Premier League</h2>
          <div class="foot-market">
            <div class="coupon-row">
              <table class="member-area-content-table"><tr>
                <td class="date">14 Oct 18:00</td>
                <td><a class="member-link" href="/en/betting/Football/England/Arsenal+vs+Chelsea+-+101">Arsenal</a>
                    <a class="member-link" href="/en/betting/Football/England/Arsenal+vs+Chelsea+-+101">Chelsea</a></td>
              </tr></table>
              <table><tr><td class="price">1.90</td><td class="price">3.40</td><td class="price">4.10</td></tr></table>
            </div>
            <div class="coupon-row"><table><tr><td class="price">2.00</td></tr></table></div>
          </div>
        </div>
        <div class="category-container"><h2 class="category-label">Women. Germany. Bundesliga</h2>
          <div class="foot-market"><div class="coupon-row">
            <table class="member-area-content-table"><tr><td class="date">15 Oct</td>
              <td><a class="member-link" href="/w/1">A</a><a class="member-link" href="/w/1">B</a></td></tr></table>
          </div></div>
        </div>
        <div class="category-container"><h2 class="category-label">Outright. World Cup 2026</h2></div>
        </body></html>"#;

    const EVENT: &str = r#"<html><body>
        <div class="coupon-row">
          <table class="member-area-content-table"><tr><td class="date">14 Oct 18:00</td>
            <td><a class="member-link" href="/e/101">Arsenal</a><a class="member-link" href="/e/101">Chelsea</a></td></tr></table>
          <table class="coupon-row-item"><tr><td class="price">1.90</td><td class="price">3.40</td><td class="price">4.10</td></tr></table>
        </div>
        <div class="market-inline-block-table-wrapper"><div class="name-field">  Total Goals    </div>
          <table><tr>
            <td class="price"><div class="coeff-value">(2.5)</div><div class="coeff-price">1.95</div></td>
            <td class="price"><div class="coeff-value">(2.5)</div><div class="coeff-price">1.85</div></td>
          </tr></table>
        </div>
        <div class="market-inline-block-table-wrapper" style="display: none"><div class="name-field">To Win Match With Handicap</div>
          <table>
            <tr><td class="price"><div class="coeff-value">(-1.5)</div><div class="coeff-price">2.60</div></td>
                <td class="price"><div class="coeff-value">(+1.5)</div><div class="coeff-price">1.50</div></td></tr>
            <tr><td class="price"><div class="coeff-value">(-1.0)</div><div class="coeff-price">2.10</div></td>
                <td class="price"><div class="coeff-value">(+1.0)</div><div class="coeff-price">1.70</div></td></tr>
          </table>
        </div>
        </body></html>"#;

    #[tokio::test]
    async fn test_listing_publishes_outcome_rows() {
        let page = SnapshotPage::new(START_URL, LISTING);
        let harness = Harness::new(START_URL, Label::Start);
        Marathon.handle(&page, &harness.context("marathon")).await.unwrap();

        let records = harness.records("marathon");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(
            record["event_url"],
            "https://www.marathonbet.com/en/betting/Football/England/Arsenal+vs+Chelsea+-+101"
        );
        assert_eq!(record["name"], "Arsenal - Chelsea");
        assert_eq!(record["datetime"], "14 Oct 18:00");
        assert_eq!(record["outcome_odds"]["draw"], 3.4);
        assert_eq!(record["total_odds"], Value::Array(vec![]));
        assert_eq!(record["event_list_url"], START_URL);
        assert_eq!(harness.stats.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_event_page_reads_hidden_markets() {
        let page = SnapshotPage::new("https://www.marathonbet.com/e/101", EVENT);
        let harness = Harness::new("https://www.marathonbet.com/e/101", Label::Event);
        Marathon.handle(&page, &harness.context("marathon")).await.unwrap();

        let records = harness.records("marathon");
        let record = &records[0];
        assert_eq!(record["outcome_odds"]["home"], 1.9);
        assert_eq!(record["total_odds"][0]["line"], 2.5);
        assert_eq!(record["total_odds"][0]["under"], 1.95);
        assert_eq!(record["total_odds"][0]["over"], 1.85);

        let sides: Vec<_> = record["handicap_odds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| (e["line"].as_f64().unwrap(), e["side"].as_str().unwrap().to_string()))
            .collect();
        assert_eq!(
            sides,
            vec![
                (-1.5, "home".to_string()),
                (-1.0, "home".to_string()),
                (1.5, "away".to_string()),
                (1.0, "away".to_string()),
            ]
        );
        assert!(record["first_half_outcome_odds"]["home"].is_null());
    }
}
