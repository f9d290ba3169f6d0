//! Reading listing pages: lazily-loaded item lists and per-row records.

use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::HandlerContext;
use crate::config::Timing;
use crate::crawl::Label;
use crate::model::{Identity, MarketField, MatchRecord};
use crate::scraper::assembler::{read_field, team_name, EventError};
use crate::scraper::dom::{Page, Region, WaitState};
use crate::scraper::gate::await_ready;
use crate::scraper::parsers::{Cells, MarketParser};
use crate::scraper::text::{squash, strip_brackets};

/// Resolve an href against the bookmaker's base URL.
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(String::from)
}

/// Enqueue the `href` of every element matching `selector`.
///
/// Waits up to the primary budget for the first link. Returns how many
/// links were handed to the dispatcher.
pub async fn enqueue_links(
    page: &dyn Page,
    selector: &str,
    base_url: &str,
    label: Label,
    cx: &HandlerContext<'_>,
) -> usize {
    let links = Region::root(page, selector);
    if !await_ready(&links.first(), WaitState::Attached, cx.timing.primary()).await.is_ready() {
        info!("No links matching {} on {}", selector, cx.request.url);
        return 0;
    }

    let mut queued = 0;
    for i in 0..links.count().await.unwrap_or(0) {
        let href = match page.attribute(links.nth(i).locator(), "href").await {
            Ok(Some(href)) => href,
            _ => continue,
        };
        if let Some(url) = absolute_url(base_url, &href) {
            cx.follow(&url, label).await;
            queued += 1;
        }
    }
    info!("Queued {} {} pages from {}", queued, label, cx.request.url);
    queued
}

/// Items of a list in document order, scrolling to load more when asked.
pub struct LazyList<'p> {
    items: Region<'p>,
    index: usize,
    loaded: usize,
    counted: bool,
    scroll: Option<Scroll>,
}

#[derive(Debug, Clone, Copy)]
struct Scroll {
    rounds_left: usize,
    pause: Duration,
}

impl<'p> LazyList<'p> {
    /// A list that is fully rendered up front.
    pub fn new(items: Region<'p>) -> Self {
        Self {
            items,
            index: 0,
            loaded: 0,
            counted: false,
            scroll: None,
        }
    }

    /// Scroll the last item into view whenever the rendered items run out.
    pub fn scrolling(mut self, max_rounds: usize, pause: Duration) -> Self {
        self.scroll = Some(Scroll {
            rounds_left: max_rounds,
            pause,
        });
        self
    }

    async fn recount(&mut self) -> usize {
        match self.items.count().await {
            Ok(n) => n,
            Err(e) => {
                debug!("Counting {:?} failed: {}", self.items, e);
                self.loaded
            }
        }
    }

    async fn load_more(&mut self, timing: &Timing) -> bool {
        let Some(scroll) = self.scroll.as_mut() else {
            return false;
        };
        if scroll.rounds_left == 0 || self.loaded == 0 {
            return false;
        }
        scroll.rounds_left -= 1;
        let pause = scroll.pause;

        let last = self.items.nth(self.loaded - 1);
        if let Err(e) = last.scroll_into_view(timing.cell()).await {
            debug!("Could not scroll list: {}", e);
            return false;
        }
        tokio::time::sleep(pause).await;

        let before = self.loaded;
        self.loaded = self.recount().await;
        self.loaded > before
    }

    /// Next item, or `None` once the list is exhausted.
    pub async fn next(&mut self, timing: &Timing) -> Option<Region<'p>> {
        if !self.counted {
            self.loaded = self.recount().await;
            self.counted = true;
        }
        if self.index >= self.loaded && !self.load_more(timing).await {
            return None;
        }
        let item = self.items.nth(self.index);
        self.index += 1;
        Some(item)
    }

    /// Items handed out so far.
    pub fn position(&self) -> usize {
        self.index
    }
}

/// Whether `item` carries the attribute value that marks a group header.
pub async fn has_marker(item: &Region<'_>, attr: &str, marker: &str) -> bool {
    match item.page().attribute(item.locator(), attr).await {
        Ok(Some(value)) => value.contains(marker),
        _ => false,
    }
}

/// Element picked out of a row.
#[derive(Debug, Clone, Copy)]
pub enum Pick {
    First(&'static str),
    Nth(&'static str, usize),
    Last(&'static str),
}

impl Pick {
    pub fn region<'p>(self, row: &Region<'p>) -> Region<'p> {
        match self {
            Pick::First(selector) => row.locate(selector).first(),
            Pick::Nth(selector, index) => row.locate(selector).nth(index),
            Pick::Last(selector) => row.locate(selector).last(),
        }
    }
}

/// Layout of one event row on a listing page.
#[derive(Debug, Clone)]
pub struct RowSpec {
    /// Element whose `href` is the event URL.
    pub link: Pick,
    pub home: Pick,
    pub away: Pick,
    /// Date inside the row; otherwise the group header's date is used.
    pub date: Option<Pick>,
    pub time: Option<Pick>,
    /// Headline price cells, home / draw / away.
    pub odds: &'static str,
    pub team_noise: &'static [&'static str],
    pub strip_datetime_brackets: bool,
}

impl RowSpec {
    /// Read one row into an outcome-only record.
    ///
    /// Any missing identifying field fails only this row.
    pub async fn read(
        &self,
        row: &Region<'_>,
        group_date: Option<&str>,
        base_url: &str,
        list_url: &str,
        timing: &Timing,
    ) -> Result<MatchRecord, EventError> {
        let href = self
            .link
            .region(row)
            .attribute("href", timing.identity())
            .await
            .ok()
            .flatten()
            .filter(|href| !href.trim().is_empty());
        let event_url = href
            .as_deref()
            .and_then(|href| absolute_url(base_url, href))
            .ok_or_else(|| EventError::MissingField {
                field: "event_url",
                url: list_url.to_string(),
            })?;

        let home = read_field(&self.home.region(row), "home_team_name", list_url, timing).await?;
        let away = read_field(&self.away.region(row), "away_team_name", list_url, timing).await?;

        let mut parts = Vec::new();
        if let Some(date) = group_date {
            parts.push(squash(date));
        }
        if let Some(date) = self.date {
            parts.push(squash(&read_field(&date.region(row), "datetime", list_url, timing).await?));
        }
        if let Some(time) = self.time {
            parts.push(squash(&read_field(&time.region(row), "datetime", list_url, timing).await?));
        }
        parts.retain(|p| !p.is_empty());
        if parts.is_empty() {
            return Err(EventError::MissingField {
                field: "datetime",
                url: list_url.to_string(),
            });
        }
        let datetime = parts.join(" ");

        let mut record = MatchRecord::new(Identity {
            event_url,
            home_team_name: team_name(&home, self.team_noise, "home_team_name", list_url)?,
            away_team_name: team_name(&away, self.team_noise, "away_team_name", list_url)?,
            datetime: if self.strip_datetime_brackets {
                strip_brackets(&datetime)
            } else {
                datetime
            },
        })
        .with_event_list_url(list_url);

        let odds = Cells::new(self.odds).parse(row, timing).await;
        if odds.is_empty() {
            debug!("No headline prices for {}", record.name);
        }
        record.apply(MarketField::Outcome, odds);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Num;
    use crate::normalize::Normalize;
    use crate::scraper::snapshot::SnapshotPage;
    use rust_decimal_macros::dec;

    fn spec() -> RowSpec {
        RowSpec {
            link: Pick::First("a"),
            home: Pick::Nth(".team", 0),
            away: Pick::Nth(".team", 1),
            date: None,
            time: Some(Pick::First(".time")),
            odds: ".price",
            team_noise: &["(Match)"],
            strip_datetime_brackets: true,
        }
    }

    #[test]
    fn test_absolute_url_resolves_relative_paths() {
        assert_eq!(
            absolute_url("https://www.pinnacle.com", "/en/soccer/a-vs-b/123/").as_deref(),
            Some("https://www.pinnacle.com/en/soccer/a-vs-b/123/")
        );
        assert_eq!(
            absolute_url("https://fon.bet", "https://fon.bet/sports/1").as_deref(),
            Some("https://fon.bet/sports/1")
        );
    }

    #[tokio::test]
    async fn test_row_reads_identity_and_prices() {
        let page = SnapshotPage::new(
            "https://www.pinnacle.com/en/soccer/england-premier-league/matchups/",
            r#"<div class="row"><a href="/en/soccer/arsenal-vs-chelsea/1/">x</a>
                <span class="team">Arsenal (Match)</span><span class="team">Chelsea (Match)</span>
                <span class="time">18:00</span>
                <span class="price">1.90</span><span class="price">3.40</span><span class="price">4.10</span></div>"#,
        );
        let row = Region::root(&page, "div.row").first();
        let record = spec()
            .read(&row, Some("Today (Tue)"), "https://www.pinnacle.com", "https://list", &Timing::fast())
            .await
            .unwrap()
            .normalize();
        assert_eq!(record.event_url, "https://www.pinnacle.com/en/soccer/arsenal-vs-chelsea/1/");
        assert_eq!(record.home_team_name, "Arsenal");
        assert_eq!(record.away_team_name, "Chelsea");
        assert_eq!(record.datetime, "Today 18:00");
        assert_eq!(record.outcome_odds.away, Num::Value(dec!(4.1)));
        assert_eq!(record.event_list_url.as_deref(), Some("https://list"));
    }

    #[tokio::test]
    async fn test_row_without_link_fails() {
        let page = SnapshotPage::new(
            "https://list",
            r#"<div class="row"><span class="team">A</span><span class="team">B</span><span class="time">1</span></div>"#,
        );
        let row = Region::root(&page, "div.row").first();
        let err = spec()
            .read(&row, None, "https://www.pinnacle.com", "https://list", &Timing::fast())
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::MissingField { field: "event_url", .. }));
    }

    #[tokio::test]
    async fn test_row_with_noise_only_team_fails() {
        let page = SnapshotPage::new(
            "https://list",
            r#"<div class="row"><a href="/e/1">x</a><span class="team">Arsenal</span><span class="team">(Match)</span>
                <span class="time">18:00</span></div>"#,
        );
        let row = Region::root(&page, "div.row").first();
        let err = spec()
            .read(&row, None, "https://www.pinnacle.com", "https://list", &Timing::fast())
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::MissingField { field: "away_team_name", .. }));
    }

    #[tokio::test]
    async fn test_enqueue_links_resolves_hrefs() {
        use crate::bookmakers::testing::Harness;

        let page = SnapshotPage::new(
            "https://betcity.ru/ru/line/soccer",
            r#"<a class="champ" href="/ru/line/soccer/1">A</a><a class="champ" href="/ru/line/soccer/2">B</a>
               <a class="champ">no href</a>"#,
        );
        let harness = Harness::new("https://betcity.ru/ru/line/soccer", Label::Start);
        let cx = harness.context("betcity");
        let queued = enqueue_links(&page, "a.champ", "https://betcity.ru", Label::Listing, &cx).await;
        assert_eq!(queued, 2);
        let urls: Vec<_> = harness.queued().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec!["https://betcity.ru/ru/line/soccer/1", "https://betcity.ru/ru/line/soccer/2"]
        );
    }

    #[tokio::test]
    async fn test_lazy_list_walks_in_order() {
        let page = SnapshotPage::new(
            "https://list",
            r#"<div class="d">Mon</div><div class="r">a</div><div class="r">b</div><div class="d">Tue</div>"#,
        );
        let mut list = LazyList::new(Region::root(&page, "div.d, div.r"));
        let timing = Timing::fast();
        let mut markers = Vec::new();
        while let Some(item) = list.next(&timing).await {
            markers.push(has_marker(&item, "class", "d").await);
        }
        assert_eq!(markers, vec![true, false, false, true]);
        assert_eq!(list.position(), 4);
    }

    #[tokio::test]
    async fn test_lazy_list_stops_when_scroll_loads_nothing() {
        let page = SnapshotPage::new("https://list", r#"<div class="r">a</div>"#);
        let mut list = LazyList::new(Region::root(&page, "div.r")).scrolling(5, Duration::ZERO);
        let timing = Timing::fast();
        assert!(list.next(&timing).await.is_some());
        assert!(list.next(&timing).await.is_none());
    }
}
