//! Market locator and per-market parsers.
//!
//! Each layout reads one market region and returns a [`MarketResult`].
//! Parsers only see their own region and never fail: a missing market is
//! empty, a broken row is skipped.

pub mod handicap;
pub mod outcome;
pub mod totals;

pub use handicap::{RowPairs, Sections};
pub use outcome::Cells;
pub use totals::{Alternating, Columns, Group, Keyword};

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::dom::{Locator, Page, Region, WaitState};
use super::gate::await_ready;
use crate::config::Timing;
use crate::model::{MarketKind, MarketResult, Num};

/// A parser for one market layout.
#[async_trait]
pub trait MarketParser: Send + Sync {
    fn kind(&self) -> MarketKind;

    /// Read a region the gate already found.
    async fn parse(&self, region: &Region<'_>, timing: &Timing) -> MarketResult;
}

/// How a bookmaker marks up its market containers.
#[derive(Debug, Clone)]
pub struct MarketLocator {
    /// Container of one market, e.g. `div[data-test-id='Collapse']`.
    pub container: &'static str,
    /// Element inside the container that carries the market name.
    pub label: &'static str,
    /// Compare the name exactly instead of by substring.
    pub exact: bool,
}

impl MarketLocator {
    pub const fn contains(container: &'static str, label: &'static str) -> Self {
        Self {
            container,
            label,
            exact: false,
        }
    }

    pub const fn exact(container: &'static str, label: &'static str) -> Self {
        Self {
            container,
            label,
            exact: true,
        }
    }

    pub fn locator(&self, name: &str) -> Locator {
        let markets = Locator::css(self.container);
        let named = if self.exact {
            markets.has_exact_text(self.label, name)
        } else {
            markets.has_text(self.label, name)
        };
        named.first()
    }

    /// First market in document order whose label matches `name`.
    ///
    /// Lazy: an absent market is only discovered by the gate.
    pub fn locate<'p>(&self, page: &'p dyn Page, name: &str) -> Region<'p> {
        Region::new(page, self.locator(name))
    }
}

/// Where a market lives on the page.
#[derive(Debug, Clone)]
pub enum Target {
    /// Found by name through the bookmaker's [`MarketLocator`].
    Named(&'static str),
    /// A fixed container, e.g. the headline price row.
    Fixed(Locator),
}

impl Target {
    pub fn fixed(selector: &str) -> Self {
        Target::Fixed(Locator::css(selector).first())
    }

    pub fn region<'p>(&self, page: &'p dyn Page, markets: &MarketLocator) -> Region<'p> {
        match self {
            Target::Named(name) => markets.locate(page, name),
            Target::Fixed(locator) => Region::new(page, locator.clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Target::Named(name) => name.trim().to_string(),
            Target::Fixed(locator) => locator.to_string(),
        }
    }
}

/// Clicks that open a collapsed market before it is read.
#[derive(Debug, Clone, Default)]
pub struct Reveal {
    /// Click the market header itself.
    pub expand: bool,
    /// A "See more" style control inside the market: selector and exact text.
    pub more: Option<(&'static str, &'static str)>,
}

impl Reveal {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn expand() -> Self {
        Self {
            expand: true,
            more: None,
        }
    }

    pub fn then_more(mut self, selector: &'static str, text: &'static str) -> Self {
        self.more = Some((selector, text));
        self
    }

    async fn run(&self, region: &Region<'_>, timing: &Timing) {
        if self.expand {
            if let Err(e) = region.click(timing.cell()).await {
                debug!("Could not expand {:?}: {}", region, e);
            }
            tokio::time::sleep(timing.settle()).await;
        }
        if let Some((selector, text)) = self.more {
            let more = region.locate(selector).with_exact_text(text).first();
            if let Err(e) = more.click(timing.cell()).await {
                debug!("No {:?} control in {:?}: {}", text, region, e);
            }
            tokio::time::sleep(timing.settle()).await;
        }
    }
}

/// Gate a market, reveal it, then parse it.
///
/// A market that does not reach `wait` within the market budget is empty.
pub async fn parse_market(
    parser: &dyn MarketParser,
    region: &Region<'_>,
    wait: WaitState,
    reveal: &Reveal,
    timing: &Timing,
) -> MarketResult {
    if !await_ready(region, wait, timing.market()).await.is_ready() {
        info!("Market {} not found", region.locator());
        return MarketResult::empty(parser.kind());
    }
    reveal.run(region, timing).await;
    parser.parse(region, timing).await
}

/// Cell text as a price leaf. Blank text is null.
pub(crate) fn price(text: String) -> Num {
    if text.trim().is_empty() {
        Num::Null
    } else {
        Num::Raw(text)
    }
}

/// Read a price cell, `Null` when it does not attach within `timeout`.
pub(crate) async fn read_price(cell: &Region<'_>, timeout: Duration) -> Num {
    match cell.text(timeout).await {
        Ok(text) => price(text),
        Err(e) => {
            debug!("Price cell unreadable: {}", e);
            Num::Null
        }
    }
}

/// Number of children a region currently holds; 0 when the query fails.
pub(crate) async fn count(region: &Region<'_>) -> usize {
    match region.count().await {
        Ok(n) => n,
        Err(e) => {
            debug!("Counting {:?} failed: {}", region, e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutcomeOdds;
    use crate::scraper::snapshot::SnapshotPage;
    use rust_decimal_macros::dec;

    const PAGE: &str = r#"
        <div data-test-id="Collapse"><span>Money Line – Match</span>
          <button><span class="style_price_1">1.90</span></button>
          <button><span class="style_price_1">3.40</span></button>
          <button><span class="style_price_1">4.10</span></button>
        </div>
        <div data-test-id="Collapse"><span>Money Line – 1st Half</span>
          <button><span class="style_price_1">2.60</span></button>
        </div>
        <div class="dops-item"><span>Total corners</span></div>
        <div class="dops-item"><span>Total</span><b>x</b></div>"#;

    #[tokio::test]
    async fn test_locate_first_match_by_substring() {
        let page = SnapshotPage::new("https://x", PAGE);
        let markets = MarketLocator::contains("div[data-test-id='Collapse']", "span");
        let region = markets.locate(&page, "Money Line");
        assert_eq!(region.locate("button").count().await.unwrap(), 3);
        assert_eq!(markets.locate(&page, "Handicap – Match").count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_locate_exact_label() {
        let page = SnapshotPage::new("https://x", PAGE);
        let markets = MarketLocator::exact("div.dops-item", "span");
        let region = markets.locate(&page, "Total");
        assert_eq!(region.locate("b").count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_market_is_empty() {
        let page = SnapshotPage::new("https://x", PAGE);
        let markets = MarketLocator::contains("div[data-test-id='Collapse']", "span");
        let region = markets.locate(&page, "Total – Match");
        let parser = Cells::new("button span[class*='style_price']");
        let result = parse_market(&parser, &region, WaitState::Visible, &Reveal::none(), &Timing::fast()).await;
        assert_eq!(result, MarketResult::Outcome(OutcomeOdds::default()));
    }

    #[tokio::test]
    async fn test_reveal_clicks_before_reading() {
        let page = SnapshotPage::new(
            "https://x",
            r#"<div data-test-id="Collapse"><span>Total – Match</span><span>See more</span>
                 <button class="market-btn"><span class="style_label">Over 2.5</span><span class="style_price">1.85</span></button>
               </div>"#,
        );
        let markets = MarketLocator::contains("div[data-test-id='Collapse']", "span");
        let region = markets.locate(&page, "Total – Match");
        let parser = Keyword::new(".market-btn", "span[class*='style_label']", "span[class*='style_price']");
        let reveal = Reveal::expand().then_more("span", "See more");
        let result = parse_market(&parser, &region, WaitState::Visible, &reveal, &Timing::fast()).await;
        assert_eq!(page.clicks().len(), 2);
        match result {
            MarketResult::Totals(entries) => assert_eq!(entries[0].line, dec!(2.5)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_blank_price_is_null() {
        assert!(price("  \n".to_string()).is_null());
        assert_eq!(price("1.5".to_string()), Num::raw("1.5"));
    }
}
