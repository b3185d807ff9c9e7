//! Price text parsing and minor-unit normalization.

use std::sync::LazyLock;

use regex::Regex;

/// Raw platform prices above this are assumed to be in minor currency units
/// (cents). Some platform endpoints return integer cents, others a patched
/// decimal string, so the value itself has to disambiguate.
pub const MINOR_UNIT_THRESHOLD: f64 = 500.0;

static EU_THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d{3},\d{2}").expect("valid regex"));
static EU_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+,\d{2}$").expect("valid regex"));
static US_THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+,\d{3}\.\d{2}").expect("valid regex"));

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Divide by 100 when the raw value is implausibly large for a price.
pub fn normalize_minor_units(raw: f64) -> f64 {
    if raw > MINOR_UNIT_THRESHOLD {
        round2(raw / 100.0)
    } else {
        round2(raw)
    }
}

/// Parse a human price string, handling `1.234,56`, `12,34` and `1,234.56`.
pub fn parse_price(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    let mut cleaned: String = text
        .replace(['€', '$', '£', '¥', '₹'], "")
        .replace("&nbsp;", "")
        .split_whitespace()
        .collect();

    if EU_THOUSANDS.is_match(&cleaned) {
        cleaned = cleaned.replace('.', "").replace(',', ".");
    } else if EU_DECIMAL.is_match(&cleaned) {
        cleaned = cleaned.replace(',', ".");
    } else if US_THOUSANDS.is_match(&cleaned) {
        cleaned = cleaned.replace(',', "");
    }

    cleaned.parse::<f64>().ok().filter(|p| p.is_finite())
}
