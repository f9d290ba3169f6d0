//! Canonicalization of assembled records.
//!
//! Every string is trimmed and every numeric leaf is coerced to a decimal or
//! null. The transform recurses through the record shape and is idempotent.

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::model::{HandicapOddsEntry, MatchRecord, Num, OutcomeOdds, Side, TotalOddsEntry};

static NON_NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9+\-.]").expect("valid regex"));

/// By-value canonicalization.
pub trait Normalize: Sized {
    fn normalize(self) -> Self;
}

/// Map the dash variants bookmakers render in prices and lines to ASCII `-`.
pub fn ascii_dashes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            c => c,
        })
        .collect()
}

/// Parse numeric text, `None` when nothing numeric remains.
pub fn coerce(text: &str) -> Option<Decimal> {
    let text = ascii_dashes(text.trim()).replace(',', "");
    let stripped = NON_NUMERIC.replace_all(&text, "");
    let stripped = stripped.strip_prefix('+').unwrap_or(&stripped);
    if stripped.is_empty() {
        return None;
    }
    Decimal::from_str(stripped).ok().map(|d| d.normalize())
}

impl Normalize for String {
    fn normalize(self) -> Self {
        let trimmed = self.trim();
        if trimmed.len() == self.len() {
            self
        } else {
            trimmed.to_string()
        }
    }
}

impl Normalize for Decimal {
    fn normalize(self) -> Self {
        Decimal::normalize(&self)
    }
}

impl Normalize for Num {
    fn normalize(self) -> Self {
        match self {
            Num::Null => Num::Null,
            Num::Raw(text) => coerce(&text).map(Num::Value).unwrap_or(Num::Null),
            Num::Value(d) => Num::Value(Decimal::normalize(&d)),
        }
    }
}

impl Normalize for Side {
    fn normalize(self) -> Self {
        self
    }
}

impl<T: Normalize> Normalize for Option<T> {
    fn normalize(self) -> Self {
        self.map(Normalize::normalize)
    }
}

impl<T: Normalize> Normalize for Vec<T> {
    fn normalize(self) -> Self {
        self.into_iter().map(Normalize::normalize).collect()
    }
}

impl Normalize for OutcomeOdds {
    fn normalize(self) -> Self {
        Self {
            home: self.home.normalize(),
            draw: self.draw.normalize(),
            away: self.away.normalize(),
        }
    }
}

impl Normalize for TotalOddsEntry {
    fn normalize(self) -> Self {
        Self {
            line: self.line.normalize(),
            over: self.over.normalize(),
            under: self.under.normalize(),
        }
    }
}

impl Normalize for HandicapOddsEntry {
    fn normalize(self) -> Self {
        Self {
            line: self.line.normalize(),
            coef: self.coef.normalize(),
            side: self.side.normalize(),
        }
    }
}

impl Normalize for MatchRecord {
    fn normalize(self) -> Self {
        Self {
            event_url: self.event_url.normalize(),
            home_team_name: self.home_team_name.normalize(),
            away_team_name: self.away_team_name.normalize(),
            name: self.name.normalize(),
            datetime: self.datetime.normalize(),
            outcome_odds: self.outcome_odds.normalize(),
            first_half_outcome_odds: self.first_half_outcome_odds.normalize(),
            second_half_outcome_odds: self.second_half_outcome_odds.normalize(),
            total_odds: self.total_odds.normalize(),
            first_half_total_odds: self.first_half_total_odds.normalize(),
            handicap_odds: self.handicap_odds.normalize(),
            first_half_handicap_odds: self.first_half_handicap_odds.normalize(),
            event_list_url: self.event_list_url.normalize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identity;
    use rust_decimal_macros::dec;

    fn raw_record() -> MatchRecord {
        let mut record = MatchRecord::new(Identity {
            event_url: " https://www.marathonbet.com/en/betting/123 ".to_string(),
            home_team_name: "  Arsenal \n".to_string(),
            away_team_name: "Chelsea\t".to_string(),
            datetime: " 14 Oct 18:00 ".to_string(),
        });
        record.outcome_odds = OutcomeOdds {
            home: Num::raw(" 1.90 "),
            draw: Num::raw("—"),
            away: Num::raw("4.10\n"),
        };
        record.total_odds.push(TotalOddsEntry {
            line: dec!(2.50),
            over: Num::raw("1.85"),
            under: Num::raw(""),
        });
        record.handicap_odds.push(HandicapOddsEntry {
            line: dec!(-1.5),
            coef: Num::raw("1,002.50"),
            side: Side::Away,
        });
        record
    }

    #[test]
    fn test_coerce_cleans_price_text() {
        assert_eq!(coerce(" 1.90 "), Some(dec!(1.9)));
        assert_eq!(coerce("\u{2212}0.5"), Some(dec!(-0.5)));
        assert_eq!(coerce("+1.5"), Some(dec!(1.5)));
        assert_eq!(coerce("1,250"), Some(dec!(1250)));
        assert_eq!(coerce("—"), None);
        assert_eq!(coerce(""), None);
        assert_eq!(coerce("1.2.3"), None);
    }

    #[test]
    fn test_team_names_trimmed() {
        let record = raw_record().normalize();
        assert_eq!(record.home_team_name, "Arsenal");
        assert_eq!(record.away_team_name, "Chelsea");
        assert_eq!(record.datetime, "14 Oct 18:00");
        assert_eq!(record.event_url, "https://www.marathonbet.com/en/betting/123");
    }

    #[test]
    fn test_numeric_leaves_are_decimal_or_null() {
        let record = raw_record().normalize();
        assert_eq!(record.outcome_odds.home, Num::Value(dec!(1.9)));
        assert_eq!(record.outcome_odds.draw, Num::Null);
        assert_eq!(record.outcome_odds.away, Num::Value(dec!(4.1)));
        assert_eq!(record.total_odds[0].under, Num::Null);
        assert_eq!(record.handicap_odds[0].coef, Num::Value(dec!(1002.5)));

        let leaves = [
            &record.outcome_odds.home,
            &record.outcome_odds.draw,
            &record.outcome_odds.away,
            &record.total_odds[0].over,
            &record.total_odds[0].under,
            &record.handicap_odds[0].coef,
        ];
        assert!(leaves.iter().all(|n| !matches!(n, Num::Raw(_))));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = raw_record().normalize();
        let twice = once.clone().normalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_trailing_zeros_stripped() {
        let entry = TotalOddsEntry {
            line: dec!(3.00),
            over: Num::Value(dec!(2.100)),
            under: Num::Null,
        }
        .normalize();
        assert_eq!(entry.line.to_string(), "3");
        assert_eq!(entry.over.value().map(|d| d.to_string()), Some("2.1".to_string()));
    }
}
