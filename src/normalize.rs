// src/normalize.rs
//! Field repairs applied after extraction.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{HarvestError, Result};

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹', '₩', '₺', '₽', '¢'];

/// Collapses whitespace runs to one space, strips markup tags, trims.
pub fn normalize_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    strip_tags(&collapsed).trim().to_string()
}

pub fn strip_tags(raw: &str) -> String {
    TAG.replace_all(raw, "").into_owned()
}

/// Parses a displayed price into a number.
///
/// `" $ 12.50+"` and `"$12.50"` both give 12.5: with several tokens the
/// second one is used, currency symbols, thousands separators and the
/// "starting at" `+` are dropped.
pub fn normalize_price(raw: &str) -> Result<f64> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let token = match tokens.as_slice() {
        [] => return Err(HarvestError::malformed("price", raw)),
        [only] => *only,
        [_, second, ..] => *second,
    };
    let cleaned: String = token
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != '+' && *c != ',')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| HarvestError::malformed("price", raw))
}

/// Parses a star rating, repairing the scale-shifted values some listing
/// pages render ("48" for 4.8, "48333" for 4.8333).
///
/// Values above 5 are rebuilt from their digits as `d.dd` (first digit, a
/// point, the next two digits); anything else is rounded to two decimals.
/// This is a heuristic for a known defect in the source markup, not a general
/// rating parser: a genuine "100" becomes 1.0.
pub fn normalize_rating(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| HarvestError::malformed("rating", raw))?;
    if !value.is_finite() || value < 0.0 {
        return Err(HarvestError::malformed("rating", raw));
    }
    if value <= 5.0 {
        return Ok(round2(value));
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    let mut chars = digits.chars();
    let Some(first) = chars.next() else {
        return Err(HarvestError::malformed("rating", raw));
    };
    let rest: String = chars.take(2).collect();
    let rebuilt = if rest.is_empty() {
        first.to_string()
    } else {
        format!("{first}.{rest}")
    };
    rebuilt
        .parse::<f64>()
        .ok()
        .filter(|v| *v <= 5.0)
        .ok_or_else(|| HarvestError::malformed("rating", raw))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pulls the first run of digits out of a label such as "(1,204)" or
/// "1,204 favorites", ignoring thousands separators.
pub fn normalize_count(raw: &str) -> Result<u32> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits
        .parse()
        .map_err(|_| HarvestError::malformed("count", raw))
}

/// Removes the "in " the shop panel puts before the shop's location.
pub fn normalize_store_location(raw: &str) -> String {
    strip_boilerplate(raw, "in ")
}

/// Removes the "From " the delivery panel puts before the ship-from location.
pub fn normalize_return_location(raw: &str) -> String {
    strip_boilerplate(raw, "From ")
}

fn strip_boilerplate(raw: &str, prefix: &str) -> String {
    let text = normalize_text(raw);
    match text.strip_prefix(prefix) {
        Some(rest) => rest.trim().to_string(),
        None => text,
    }
}
