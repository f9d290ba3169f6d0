//! Over/under markets.

use async_trait::async_trait;
use tracing::debug;

use super::{count, read_price, MarketParser};
use crate::config::Timing;
use crate::model::{MarketKind, MarketResult, OverUnder, TotalOdds};
use crate::scraper::dom::Region;
use crate::scraper::text::{clean_line, mentions};

/// One price button per side; the label says "Over" or "Under".
#[derive(Debug, Clone)]
pub struct Keyword {
    pub buttons: &'static str,
    pub label: &'static str,
    pub price: &'static str,
    pub keyword: &'static str,
}

impl Keyword {
    pub const fn new(buttons: &'static str, label: &'static str, price: &'static str) -> Self {
        Self {
            buttons,
            label,
            price,
            keyword: "Over",
        }
    }
}

#[async_trait]
impl MarketParser for Keyword {
    fn kind(&self) -> MarketKind {
        MarketKind::Total
    }

    async fn parse(&self, region: &Region<'_>, timing: &Timing) -> MarketResult {
        let buttons = region.locate(self.buttons);
        let mut totals = TotalOdds::default();

        for i in 0..count(&buttons).await {
            let button = buttons.nth(i);
            let label = match button.locate(self.label).text(timing.cell()).await {
                Ok(label) => label,
                Err(e) => {
                    debug!("Skipping total button {}: {}", i, e);
                    continue;
                }
            };
            let Some(line) = clean_line(&label) else {
                debug!("Total label {:?} has no line", label);
                continue;
            };
            let side = if mentions(&label, self.keyword) {
                OverUnder::Over
            } else {
                OverUnder::Under
            };
            let price = read_price(&button.locate(self.price), timing.cell()).await;
            totals.observe(line, side, price);
        }

        MarketResult::Totals(totals.into_entries())
    }
}

/// Labelled cells alternating under, over, under, over.
///
/// Cells without a label element do not count toward the alternation.
#[derive(Debug, Clone)]
pub struct Alternating {
    pub cells: &'static str,
    pub label: &'static str,
    pub price: &'static str,
}

impl Alternating {
    pub const fn new(cells: &'static str, label: &'static str, price: &'static str) -> Self {
        Self { cells, label, price }
    }
}

#[async_trait]
impl MarketParser for Alternating {
    fn kind(&self) -> MarketKind {
        MarketKind::Total
    }

    async fn parse(&self, region: &Region<'_>, timing: &Timing) -> MarketResult {
        let cells = region.locate(self.cells);
        let mut totals = TotalOdds::default();
        let mut labelled = 0usize;

        for i in 0..count(&cells).await {
            let cell = cells.nth(i);
            let label = cell.locate(self.label);
            if count(&label).await == 0 {
                continue;
            }
            let side = if labelled % 2 == 0 {
                OverUnder::Under
            } else {
                OverUnder::Over
            };
            labelled += 1;

            let text = match label.text(timing.cell()).await {
                Ok(text) => text,
                Err(e) => {
                    debug!("Skipping total cell {}: {}", i, e);
                    continue;
                }
            };
            let Some(line) = clean_line(&text) else {
                debug!("Total label {:?} has no line", text);
                continue;
            };
            // Suspended prices leave the cell without a price element.
            let price = read_price(&cell.locate(self.price), timing.optional_cell()).await;
            totals.observe(line, side, price);
        }

        MarketResult::Totals(totals.into_entries())
    }
}

/// Cell positions of one line inside a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub line: usize,
    pub over: usize,
    pub under: usize,
}

/// Rows of cells, each row holding one or more `(line, over, under)` groups.
#[derive(Debug, Clone)]
pub struct Columns {
    pub rows: &'static str,
    pub cells: &'static str,
    pub groups: Vec<Group>,
}

impl Columns {
    pub fn new(rows: &'static str, cells: &'static str, groups: Vec<Group>) -> Self {
        Self { rows, cells, groups }
    }
}

#[async_trait]
impl MarketParser for Columns {
    fn kind(&self) -> MarketKind {
        MarketKind::Total
    }

    async fn parse(&self, region: &Region<'_>, timing: &Timing) -> MarketResult {
        let rows = region.locate(self.rows);
        let mut totals = TotalOdds::default();

        'rows: for i in 0..count(&rows).await {
            let cells = rows.nth(i).locate(self.cells);
            for group in &self.groups {
                let text = match cells.nth(group.line).text(timing.cell()).await {
                    Ok(text) => text,
                    Err(e) => {
                        debug!("Skipping rest of total row {}: {}", i, e);
                        continue 'rows;
                    }
                };
                let Some(line) = clean_line(&text) else {
                    continue;
                };
                let over = read_price(&cells.nth(group.over), timing.cell()).await;
                let under = read_price(&cells.nth(group.under), timing.cell()).await;
                totals.observe(line, OverUnder::Over, over);
                totals.observe(line, OverUnder::Under, under);
            }
        }

        MarketResult::Totals(totals.into_entries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Num, TotalOddsEntry};
    use crate::normalize::Normalize;
    use crate::scraper::snapshot::SnapshotPage;
    use rust_decimal_macros::dec;

    async fn parse(parser: &dyn MarketParser, html: &str) -> Vec<TotalOddsEntry> {
        let page = SnapshotPage::new("https://x", html);
        let region = Region::root(&page, "div.market").first();
        match parser.parse(&region, &Timing::fast()).await {
            MarketResult::Totals(entries) => entries.normalize(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_keyword_merges_over_and_under() {
        let html = r#"<div class="market">
            <button class="market-btn"><span class="style_label_x">Over 2.5</span><span class="style_price_x">1.85</span></button>
            <button class="market-btn"><span class="style_label_x">Under 2.5</span><span class="style_price_x">1.95</span></button>
            <button class="market-btn"><span class="style_label_x">Over 3.0</span><span class="style_price_x">2.40</span></button>
        </div>"#;
        let parser = Keyword::new(".market-btn", "span[class*='style_label']", "span[class*='style_price']");
        let entries = parse(&parser, html).await;
        assert_eq!(
            entries[0],
            TotalOddsEntry {
                line: dec!(2.5),
                over: Num::Value(dec!(1.85)),
                under: Num::Value(dec!(1.95)),
            }
        );
        assert_eq!(entries[1].line, dec!(3));
        assert!(entries[1].under.is_null());
    }

    #[tokio::test]
    async fn test_alternating_under_first_skips_unlabelled() {
        let html = r#"<div class="market"><table><tr>
            <td class="price"><div class="coeff-value">(2.5)</div><div class="coeff-price">1.95</div></td>
            <td class="price empty"></td>
            <td class="price"><div class="coeff-value">(2.5)</div><div class="coeff-price">1.85</div></td>
            <td class="price"><div class="coeff-value">(3.5)</div></td>
            <td class="price"><div class="coeff-value">(3.5)</div><div class="coeff-price">3.10</div></td>
        </tr></table></div>"#;
        let parser = Alternating::new("td[class*='price']", ".coeff-value", ".coeff-price");
        let entries = parse(&parser, html).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].under, Num::Value(dec!(1.95)));
        assert_eq!(entries[0].over, Num::Value(dec!(1.85)));
        assert!(entries[1].under.is_null());
        assert_eq!(entries[1].over, Num::Value(dec!(3.1)));
    }

    #[tokio::test]
    async fn test_columns_two_groups_per_row() {
        let html = r#"<div class="market">
            <div class="row-common">
              <div class="cell-wrap">2.5</div><div class="cell-wrap">1.80</div><div class="cell-wrap">2.00</div>
              <div class="cell-wrap separator"></div>
              <div class="cell-wrap">3</div><div class="cell-wrap">2.90</div><div class="cell-wrap">1.40</div>
            </div>
            <div class="row-common">
              <div class="cell-wrap">3.5</div><div class="cell-wrap">3.70</div><div class="cell-wrap">1.25</div>
            </div>
        </div>"#;
        let parser = Columns::new(
            "div[class*='row-common']",
            "div[class*='cell-wrap']:not([class*='separator'])",
            vec![
                Group { line: 0, over: 1, under: 2 },
                Group { line: 3, over: 4, under: 5 },
            ],
        );
        let entries = parse(&parser, html).await;
        let lines: Vec<_> = entries.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![dec!(2.5), dec!(3), dec!(3.5)]);
        assert_eq!(entries[1].over, Num::Value(dec!(2.9)));
        assert_eq!(entries[2].under, Num::Value(dec!(1.25)));
    }

    #[tokio::test]
    async fn test_zero_rows_is_empty() {
        let parser = Columns::new("div.row", "div.cell", vec![Group { line: 0, over: 2, under: 1 }]);
        assert!(parse(&parser, r#"<div class="market"></div>"#).await.is_empty());
    }
}
