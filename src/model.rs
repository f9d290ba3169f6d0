//! Canonical match record published to the output queues.
//!
//! Field names here are the wire contract read by downstream consumers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use tracing::warn;

/// A numeric leaf: raw scraped text until normalized, then a decimal or null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Num {
    #[default]
    Null,
    Raw(String),
    Value(Decimal),
}

impl Num {
    pub fn raw(text: impl Into<String>) -> Self {
        Num::Raw(text.into())
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            Num::Value(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Num::Null)
    }
}

impl From<Option<String>> for Num {
    fn from(text: Option<String>) -> Self {
        text.map(Num::Raw).unwrap_or_default()
    }
}

fn serialize_decimal<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    match value.to_f64().filter(|f| f.is_finite()) {
        Some(f) => serializer.serialize_f64(f),
        None => serializer.serialize_none(),
    }
}

impl Serialize for Num {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Num::Null => serializer.serialize_none(),
            Num::Raw(text) => serializer.serialize_str(text),
            Num::Value(d) => serialize_decimal(d, serializer),
        }
    }
}

/// Home / draw / away prices. `draw` stays null for two-way markets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OutcomeOdds {
    pub home: Num,
    pub draw: Num,
    pub away: Num,
}

impl OutcomeOdds {
    pub fn is_empty(&self) -> bool {
        self.home.is_null() && self.draw.is_null() && self.away.is_null()
    }
}

/// Over/under prices for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalOddsEntry {
    #[serde(serialize_with = "serialize_decimal")]
    pub line: Decimal,
    pub over: Num,
    pub under: Num,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverUnder {
    Over,
    Under,
}

/// Accumulates total observations, merging on the numeric line.
#[derive(Debug, Default)]
pub struct TotalOdds {
    entries: Vec<TotalOddsEntry>,
}

impl TotalOdds {
    /// Record one price. A null price never clears a value seen earlier.
    pub fn observe(&mut self, line: Decimal, side: OverUnder, price: Num) {
        let index = match self.entries.iter().position(|e| e.line == line) {
            Some(index) => index,
            None => {
                self.entries.push(TotalOddsEntry {
                    line: line.normalize(),
                    over: Num::Null,
                    under: Num::Null,
                });
                self.entries.len() - 1
            }
        };

        if price.is_null() {
            return;
        }
        let entry = &mut self.entries[index];
        match side {
            OverUnder::Over => entry.over = price,
            OverUnder::Under => entry.under = price,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<TotalOddsEntry> {
        self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

/// One handicap price. Entries are appended as seen, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandicapOddsEntry {
    #[serde(serialize_with = "serialize_decimal")]
    pub line: Decimal,
    pub coef: Num,
    pub side: Side,
}

/// Shape of a market's parsed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    Outcome,
    Total,
    Handicap,
}

/// Result of one market parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketResult {
    Outcome(OutcomeOdds),
    Totals(Vec<TotalOddsEntry>),
    Handicaps(Vec<HandicapOddsEntry>),
}

impl MarketResult {
    /// Neutral value for a market that is not on the page.
    pub fn empty(kind: MarketKind) -> Self {
        match kind {
            MarketKind::Outcome => MarketResult::Outcome(OutcomeOdds::default()),
            MarketKind::Total => MarketResult::Totals(Vec::new()),
            MarketKind::Handicap => MarketResult::Handicaps(Vec::new()),
        }
    }

    pub fn kind(&self) -> MarketKind {
        match self {
            MarketResult::Outcome(_) => MarketKind::Outcome,
            MarketResult::Totals(_) => MarketKind::Total,
            MarketResult::Handicaps(_) => MarketKind::Handicap,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MarketResult::Outcome(odds) => odds.is_empty(),
            MarketResult::Totals(entries) => entries.is_empty(),
            MarketResult::Handicaps(entries) => entries.is_empty(),
        }
    }
}

/// Record slot a market result is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketField {
    Outcome,
    Total,
    Handicap,
    FirstHalfOutcome,
    SecondHalfOutcome,
    FirstHalfTotal,
    FirstHalfHandicap,
}

impl MarketField {
    pub fn kind(self) -> MarketKind {
        match self {
            MarketField::Outcome | MarketField::FirstHalfOutcome | MarketField::SecondHalfOutcome => {
                MarketKind::Outcome
            }
            MarketField::Total | MarketField::FirstHalfTotal => MarketKind::Total,
            MarketField::Handicap | MarketField::FirstHalfHandicap => MarketKind::Handicap,
        }
    }

    /// Wire name of the record field.
    pub fn as_str(self) -> &'static str {
        match self {
            MarketField::Outcome => "outcome_odds",
            MarketField::Total => "total_odds",
            MarketField::Handicap => "handicap_odds",
            MarketField::FirstHalfOutcome => "first_half_outcome_odds",
            MarketField::SecondHalfOutcome => "second_half_outcome_odds",
            MarketField::FirstHalfTotal => "first_half_total_odds",
            MarketField::FirstHalfHandicap => "first_half_handicap_odds",
        }
    }
}

/// Fields that identify an event. All are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub event_url: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub datetime: String,
}

/// One event with every market the bookmaker offered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub event_url: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub name: String,
    pub datetime: String,
    pub outcome_odds: OutcomeOdds,
    pub first_half_outcome_odds: OutcomeOdds,
    pub second_half_outcome_odds: OutcomeOdds,
    pub total_odds: Vec<TotalOddsEntry>,
    pub first_half_total_odds: Vec<TotalOddsEntry>,
    pub handicap_odds: Vec<HandicapOddsEntry>,
    pub first_half_handicap_odds: Vec<HandicapOddsEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_list_url: Option<String>,
}

impl MatchRecord {
    /// Empty record for an identified event.
    pub fn new(identity: Identity) -> Self {
        let name = format!(
            "{} - {}",
            identity.home_team_name.trim(),
            identity.away_team_name.trim()
        );
        Self {
            event_url: identity.event_url,
            home_team_name: identity.home_team_name,
            away_team_name: identity.away_team_name,
            name,
            datetime: identity.datetime,
            outcome_odds: OutcomeOdds::default(),
            first_half_outcome_odds: OutcomeOdds::default(),
            second_half_outcome_odds: OutcomeOdds::default(),
            total_odds: Vec::new(),
            first_half_total_odds: Vec::new(),
            handicap_odds: Vec::new(),
            first_half_handicap_odds: Vec::new(),
            event_list_url: None,
        }
    }

    pub fn with_event_list_url(mut self, url: impl Into<String>) -> Self {
        self.event_list_url = Some(url.into());
        self
    }

    /// Store a market result in its slot. Returns false on a shape mismatch.
    pub fn apply(&mut self, field: MarketField, result: MarketResult) -> bool {
        match (field, result) {
            (MarketField::Outcome, MarketResult::Outcome(odds)) => self.outcome_odds = odds,
            (MarketField::FirstHalfOutcome, MarketResult::Outcome(odds)) => {
                self.first_half_outcome_odds = odds
            }
            (MarketField::SecondHalfOutcome, MarketResult::Outcome(odds)) => {
                self.second_half_outcome_odds = odds
            }
            (MarketField::Total, MarketResult::Totals(entries)) => self.total_odds = entries,
            (MarketField::FirstHalfTotal, MarketResult::Totals(entries)) => {
                self.first_half_total_odds = entries
            }
            (MarketField::Handicap, MarketResult::Handicaps(entries)) => self.handicap_odds = entries,
            (MarketField::FirstHalfHandicap, MarketResult::Handicaps(entries)) => {
                self.first_half_handicap_odds = entries
            }
            (field, result) => {
                warn!(
                    "Discarding {:?} result for field {}",
                    result.kind(),
                    field.as_str()
                );
                return false;
            }
        }
        true
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn identity() -> Identity {
        Identity {
            event_url: "https://fon.bet/sports/football/1".to_string(),
            home_team_name: " Arsenal ".to_string(),
            away_team_name: "Chelsea".to_string(),
            datetime: "Today 18:00".to_string(),
        }
    }

    #[test]
    fn test_totals_merge_on_line() {
        let mut totals = TotalOdds::default();
        totals.observe(dec!(2.5), OverUnder::Over, Num::raw("1.85"));
        totals.observe(dec!(2.50), OverUnder::Under, Num::raw("1.95"));
        let entries = totals.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, dec!(2.5));
        assert_eq!(entries[0].over, Num::raw("1.85"));
        assert_eq!(entries[0].under, Num::raw("1.95"));
    }

    #[test]
    fn test_null_observation_keeps_existing_price() {
        let mut totals = TotalOdds::default();
        totals.observe(dec!(3), OverUnder::Over, Num::raw("2.10"));
        totals.observe(dec!(3), OverUnder::Over, Num::Null);
        totals.observe(dec!(3.5), OverUnder::Under, Num::Null);
        let entries = totals.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].over, Num::raw("2.10"));
        assert!(entries[1].under.is_null());
    }

    #[test]
    fn test_empty_results_per_kind() {
        assert!(MarketResult::empty(MarketKind::Total).is_empty());
        assert_eq!(
            MarketResult::empty(MarketKind::Outcome),
            MarketResult::Outcome(OutcomeOdds::default())
        );
    }

    #[test]
    fn test_apply_rejects_shape_mismatch() {
        let mut record = MatchRecord::new(identity());
        assert!(!record.apply(MarketField::Total, MarketResult::empty(MarketKind::Outcome)));
        assert!(record.apply(
            MarketField::FirstHalfTotal,
            MarketResult::Totals(vec![TotalOddsEntry {
                line: dec!(1.5),
                over: Num::Null,
                under: Num::Null,
            }])
        ));
        assert_eq!(record.first_half_total_odds.len(), 1);
    }

    #[test]
    fn test_record_serializes_wire_fields() {
        let mut record = MatchRecord::new(identity());
        record.outcome_odds.home = Num::Value(dec!(1.9));
        record.handicap_odds.push(HandicapOddsEntry {
            line: dec!(-1.5),
            coef: Num::Value(dec!(2.05)),
            side: Side::Home,
        });
        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["name"], "Arsenal - Chelsea");
        assert_eq!(json["outcome_odds"]["home"], 1.9);
        assert!(json["outcome_odds"]["draw"].is_null());
        assert_eq!(json["handicap_odds"][0]["line"], -1.5);
        assert_eq!(json["handicap_odds"][0]["side"], "home");
        assert_eq!(json["total_odds"], serde_json::json!([]));
        assert!(json.get("event_list_url").is_none());
    }
}
