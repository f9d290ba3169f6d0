//! Competition filters applied before any event of a competition is read.

use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

static YOUTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"U\d\d").expect("valid regex"));

const STOP_WORDS: [&str; 2] = ["Statistics", "Statisctics"];

/// Reason to skip a competition, matched against its title or name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Statistics pages dressed up as competitions.
    Statistics,
    /// Title mentions "Women".
    Women,
    /// Lowercased name starts with the given prefix, e.g. `wom.`.
    WomenPrefix(&'static str),
    /// Youth leagues: `U19`, `U21`, ...
    Youth,
    /// Lowercased name starts with `outright.`.
    Outright,
}

impl Rule {
    fn matches(self, name: &str) -> bool {
        match self {
            Rule::Statistics => STOP_WORDS.iter().any(|w| name.contains(w)),
            Rule::Women => name.contains("Women"),
            Rule::WomenPrefix(prefix) => name.trim().to_lowercase().starts_with(prefix),
            Rule::Youth => YOUTH.is_match(name),
            Rule::Outright => name.trim().to_lowercase().starts_with("outright."),
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Rule::Statistics => "a statistics page",
            Rule::Women | Rule::WomenPrefix(_) => "a women's league",
            Rule::Youth => "a youth league",
            Rule::Outright => "an outright bet",
        }
    }
}

/// First rule that excludes `name`, if any.
pub fn skip_reason(name: &str, rules: &[Rule]) -> Option<&'static str> {
    rules.iter().find(|rule| rule.matches(name)).map(|rule| rule.reason())
}

/// Check `name` against `rules`, logging the skip with the page it was seen on.
pub fn skipped(name: &str, rules: &[Rule], url: &str) -> bool {
    match skip_reason(name, rules) {
        Some(reason) => {
            info!("Competition {:?} is {}, skipping ({})", name.trim(), reason, url);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TITLE_RULES: &[Rule] = &[Rule::Statistics, Rule::Women, Rule::Youth];

    #[test]
    fn test_title_rules() {
        assert_eq!(skip_reason("England. Premier League", TITLE_RULES), None);
        assert_eq!(skip_reason("Statisctics. Corners", TITLE_RULES), Some("a statistics page"));
        assert_eq!(skip_reason("Spain. Liga F Women", TITLE_RULES), Some("a women's league"));
        assert_eq!(skip_reason("Europe. UEFA U19 Championship", TITLE_RULES), Some("a youth league"));
    }

    #[test]
    fn test_prefix_rules_ignore_case() {
        let rules = [Rule::WomenPrefix("women."), Rule::Outright];
        assert_eq!(skip_reason("Women. Germany. Bundesliga", &rules), Some("a women's league"));
        assert_eq!(skip_reason("Outright. World Cup 2026", &rules), Some("an outright bet"));
        assert_eq!(skip_reason("Germany. Bundesliga", &rules), None);
    }

    #[test]
    fn test_youth_needs_two_digits() {
        assert_eq!(skip_reason("Club Friendlies", &[Rule::Youth]), None);
        assert_eq!(skip_reason("Ultras Cup", &[Rule::Youth]), None);
        assert_eq!(skip_reason("Italy. Primavera U20", &[Rule::Youth]), Some("a youth league"));
    }
}
