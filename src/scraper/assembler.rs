//! Match assembler: one event page in, one record out.

use thiserror::Error;
use tracing::{debug, info};

use super::dom::{DomError, Locator, Page, Region, WaitState};
use super::gate::{await_page, await_ready, Recovery};
use super::parsers::{parse_market, MarketLocator, MarketParser, Reveal, Target};
use super::text::{squash, strip_brackets, strip_tokens};
use crate::config::Timing;
use crate::model::{Identity, MarketField, MatchRecord};

/// Why an event produced no record.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event page {url} did not load")]
    NotLoaded { url: String },

    #[error("missing {field} on {url}")]
    MissingField { field: &'static str, url: String },

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// One market to read from an event page.
pub struct MarketSpec {
    pub field: MarketField,
    pub target: Target,
    /// Half-time markets often sit in the DOM behind a closed tab.
    pub wait: WaitState,
    pub reveal: Reveal,
    /// Tab that must be active before this market is read.
    pub tab: Option<&'static str>,
    pub parser: Box<dyn MarketParser>,
}

impl MarketSpec {
    pub fn new(field: MarketField, target: Target, parser: impl MarketParser + 'static) -> Self {
        Self {
            field,
            target,
            wait: WaitState::Visible,
            reveal: Reveal::none(),
            tab: None,
            parser: Box::new(parser),
        }
    }

    pub fn attached(mut self) -> Self {
        self.wait = WaitState::Attached;
        self
    }

    pub fn reveal(mut self, reveal: Reveal) -> Self {
        self.reveal = reveal;
        self
    }

    pub fn on_tab(mut self, tab: &'static str) -> Self {
        self.tab = Some(tab);
        self
    }
}

/// Where the identifying fields of an event page live.
#[derive(Debug, Clone)]
pub struct IdentitySpec {
    pub home: Locator,
    pub away: Locator,
    pub date: Locator,
    /// Read separately and joined to the date with a space.
    pub time: Option<Locator>,
    /// Tokens removed from team names, e.g. `(Match)`.
    pub team_noise: &'static [&'static str],
    /// Drop bracketed hints such as `(Today)` from the datetime.
    pub strip_datetime_brackets: bool,
}

impl IdentitySpec {
    async fn read(&self, page: &dyn Page, url: &str, timing: &Timing) -> Result<Identity, EventError> {
        let home = read_field(&Region::new(page, self.home.clone()), "home_team_name", url, timing).await?;
        let away = read_field(&Region::new(page, self.away.clone()), "away_team_name", url, timing).await?;
        let date = read_field(&Region::new(page, self.date.clone()), "datetime", url, timing).await?;
        let datetime = match &self.time {
            Some(time) => {
                let time = read_field(&Region::new(page, time.clone()), "datetime", url, timing).await?;
                format!("{} {}", squash(&date), squash(&time))
            }
            None => squash(&date),
        };

        Ok(Identity {
            event_url: url.to_string(),
            home_team_name: team_name(&home, self.team_noise, "home_team_name", url)?,
            away_team_name: team_name(&away, self.team_noise, "away_team_name", url)?,
            datetime: if self.strip_datetime_brackets {
                strip_brackets(&datetime)
            } else {
                datetime
            },
        })
    }
}

/// Read a required text field; absence is a hard failure for the event.
pub async fn read_field(
    region: &Region<'_>,
    field: &'static str,
    url: &str,
    timing: &Timing,
) -> Result<String, EventError> {
    match region.text(timing.identity()).await {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        Ok(_) => Err(EventError::MissingField {
            field,
            url: url.to_string(),
        }),
        Err(e) => {
            debug!("{} unreadable: {}", field, e);
            Err(EventError::MissingField {
                field,
                url: url.to_string(),
            })
        }
    }
}

/// Remove `noise` tokens from a team name. A name that was nothing but
/// noise counts as missing.
pub fn team_name(raw: &str, noise: &[&str], field: &'static str, url: &str) -> Result<String, EventError> {
    let name = strip_tokens(raw, noise);
    if name.trim().is_empty() {
        return Err(EventError::MissingField {
            field,
            url: url.to_string(),
        });
    }
    Ok(name)
}

/// Everything needed to read one bookmaker's event page.
pub struct EventProfile {
    pub markets: MarketLocator,
    /// Outcome market used as the "page is loaded" beacon.
    pub beacon: Target,
    pub beacon_wait: WaitState,
    pub recovery: Recovery,
    pub identity: IdentitySpec,
    /// Tab headers; a market's `tab` is matched against their own text.
    pub tabs: Option<&'static str>,
    /// Read in order: outcome, totals, handicap, then half splits.
    pub specs: Vec<MarketSpec>,
}

async fn switch_tab(page: &dyn Page, tabs: &str, name: &str, timing: &Timing) {
    let tab = Region::new(page, Locator::css(tabs).with_text(name).first());
    if !await_ready(&tab, WaitState::Visible, timing.tab()).await.is_ready() {
        info!("Tab {} not visible, skipping", name);
        return;
    }
    if let Err(e) = tab.click(timing.tab()).await {
        info!("Could not open tab {}: {}", name, e);
        return;
    }
    tokio::time::sleep(timing.settle()).await;
}

/// Assemble the record for the event currently open on `page`.
///
/// Markets that are not offered come back empty. Only an unloaded page or a
/// missing identifying field fails the event.
pub async fn assemble_event(
    page: &dyn Page,
    profile: &EventProfile,
    timing: &Timing,
) -> Result<MatchRecord, EventError> {
    let url = page.url().await?;
    if url.trim().is_empty() {
        return Err(EventError::MissingField {
            field: "event_url",
            url,
        });
    }

    let beacon = profile.beacon.region(page, &profile.markets);
    let ready = await_page(page, beacon.locator(), profile.beacon_wait, &profile.recovery, timing).await;
    if !ready.is_ready() {
        return Err(EventError::NotLoaded { url });
    }

    let identity = profile.identity.read(page, &url, timing).await?;
    let mut record = MatchRecord::new(identity);

    let mut active_tab: Option<&str> = None;
    for spec in &profile.specs {
        if let (Some(tab), Some(tabs)) = (spec.tab, profile.tabs) {
            if active_tab != Some(tab) {
                switch_tab(page, tabs, tab, timing).await;
                active_tab = Some(tab);
            }
        }

        let region = spec.target.region(page, &profile.markets);
        let result = parse_market(spec.parser.as_ref(), &region, spec.wait, &spec.reveal, timing).await;
        if result.is_empty() {
            info!("{} empty for {} on {}", spec.field.as_str(), spec.target.describe(), url);
        }
        record.apply(spec.field, result);
    }

    Ok(record)
}
