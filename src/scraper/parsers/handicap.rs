//! Handicap markets. Entries are appended in reading order, home side first.

use async_trait::async_trait;
use tracing::debug;

use super::{count, read_price, MarketParser};
use crate::config::Timing;
use crate::model::{HandicapOddsEntry, MarketKind, MarketResult, Side};
use crate::scraper::dom::Region;
use crate::scraper::text::clean_line;

async fn read_entry(
    cell: &Region<'_>,
    label: &str,
    price: &str,
    side: Side,
    timing: &Timing,
) -> Option<HandicapOddsEntry> {
    let text = match cell.locate(label).text(timing.cell()).await {
        Ok(text) => text,
        Err(e) => {
            debug!("Skipping {:?} handicap cell: {}", side, e);
            return None;
        }
    };
    let Some(line) = clean_line(&text) else {
        debug!("Handicap label {:?} has no line", text);
        return None;
    };
    Some(HandicapOddsEntry {
        line,
        coef: read_price(&cell.locate(price), timing.cell()).await,
        side,
    })
}

/// Separate home and away column lists.
#[derive(Debug, Clone)]
pub struct Sections {
    pub home: &'static str,
    pub away: &'static str,
    pub label: &'static str,
    pub price: &'static str,
}

#[async_trait]
impl MarketParser for Sections {
    fn kind(&self) -> MarketKind {
        MarketKind::Handicap
    }

    async fn parse(&self, region: &Region<'_>, timing: &Timing) -> MarketResult {
        let mut entries = Vec::new();
        for (rows, side) in [(self.home, Side::Home), (self.away, Side::Away)] {
            let rows = region.locate(rows);
            for i in 0..count(&rows).await {
                if let Some(entry) = read_entry(&rows.nth(i), self.label, self.price, side, timing).await {
                    entries.push(entry);
                }
            }
        }
        MarketResult::Handicaps(entries)
    }
}

/// Table rows whose first labelled cell is home and second is away.
#[derive(Debug, Clone)]
pub struct RowPairs {
    pub rows: &'static str,
    pub cells: &'static str,
    pub label: &'static str,
    pub price: &'static str,
}

#[async_trait]
impl MarketParser for RowPairs {
    fn kind(&self) -> MarketKind {
        MarketKind::Handicap
    }

    async fn parse(&self, region: &Region<'_>, timing: &Timing) -> MarketResult {
        let rows = region.locate(self.rows);
        let mut home = Vec::new();
        let mut away = Vec::new();

        for i in 0..count(&rows).await {
            let cells = rows.nth(i).locate(self.cells);
            let mut labelled = Vec::new();
            for j in 0..count(&cells).await {
                let cell = cells.nth(j);
                if count(&cell.locate(self.label)).await > 0 {
                    labelled.push(cell);
                }
                if labelled.len() == 2 {
                    break;
                }
            }

            for (cell, side) in labelled.iter().zip([Side::Home, Side::Away]) {
                if let Some(entry) = read_entry(cell, self.label, self.price, side, timing).await {
                    match side {
                        Side::Home => home.push(entry),
                        Side::Away => away.push(entry),
                    }
                }
            }
        }

        home.extend(away);
        MarketResult::Handicaps(home)
    }
}
