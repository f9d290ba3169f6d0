//! Home / draw / away prices.

use async_trait::async_trait;

use super::{count, read_price, MarketParser};
use crate::config::Timing;
use crate::model::{MarketKind, MarketResult, OutcomeOdds};
use crate::scraper::dom::Region;

/// Price cells in home, draw, away order. Two cells mean a two-way market.
#[derive(Debug, Clone)]
pub struct Cells {
    pub cells: &'static str,
}

impl Cells {
    pub const fn new(cells: &'static str) -> Self {
        Self { cells }
    }
}

#[async_trait]
impl MarketParser for Cells {
    fn kind(&self) -> MarketKind {
        MarketKind::Outcome
    }

    async fn parse(&self, region: &Region<'_>, timing: &Timing) -> MarketResult {
        let cells = region.locate(self.cells);
        let mut odds = OutcomeOdds::default();

        // Only cells that exist are read, so a partial row costs no waits.
        match count(&cells).await {
            0 => {}
            1 => {
                odds.home = read_price(&cells.nth(0), timing.cell()).await;
            }
            2 => {
                odds.home = read_price(&cells.nth(0), timing.cell()).await;
                odds.away = read_price(&cells.nth(1), timing.cell()).await;
            }
            _ => {
                odds.home = read_price(&cells.nth(0), timing.cell()).await;
                odds.draw = read_price(&cells.nth(1), timing.cell()).await;
                odds.away = read_price(&cells.nth(2), timing.cell()).await;
            }
        }

        MarketResult::Outcome(odds)
    }
}
