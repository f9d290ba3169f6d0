//! Label and line text helpers shared by the market parsers.

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::normalize::ascii_dashes;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+\-]?\d+(?:\.\d+)?").expect("valid regex"));
static NON_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9+\-.]").expect("valid regex"));
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

fn parse_signed(text: &str) -> Option<Decimal> {
    let text = text.strip_prefix('+').unwrap_or(text);
    Decimal::from_str(text).ok()
}

/// Extract the numeric line from a market label.
///
/// `"Han1 (-1.5)"` gives `-1.5`, `"Total 2.5"` gives `2.5`, `"+0.25"` gives `0.25`.
/// When the label carries a parenthesised part, only that part is read.
pub fn clean_line(label: &str) -> Option<Decimal> {
    let label = ascii_dashes(label);
    let scope = BRACKETED
        .captures_iter(&label)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| label.clone());

    let stripped = NON_LINE.replace_all(&scope, "");
    if let Some(line) = parse_signed(&stripped) {
        return Some(line.normalize());
    }

    NUMBER
        .find_iter(&scope)
        .last()
        .and_then(|m| parse_signed(m.as_str()))
        .map(|d| d.normalize())
}

/// Collapse runs of whitespace and trim.
pub fn squash(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Remove every bracketed `( ... )` group, e.g. a relative day hint.
pub fn strip_brackets(text: &str) -> String {
    squash(&BRACKETED.replace_all(text, ""))
}

/// Remove each token, then squash whitespace.
pub fn strip_tokens(text: &str, tokens: &[&str]) -> String {
    let mut out = text.to_string();
    for token in tokens {
        out = out.replace(token, "");
    }
    squash(&out)
}

/// Whether `text` mentions the keyword, ignoring case.
pub fn mentions(text: &str, keyword: &str) -> bool {
    text.to_lowercase().contains(&keyword.to_lowercase())
}
