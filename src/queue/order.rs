//! Sort strategies for the time-ordered queue
//!
//! The default [`LexicalOrder`] compares raw record text. That is only
//! chronological when the instruments emit fixed-width, zero-padded
//! timestamps at the start of each line. [`LeadingTimestampOrder`] parses the
//! leading field as a decimal number of seconds instead.

use crate::core::Record;
use serde::{Deserialize, Serialize};

/// Fractional digits kept by [`LeadingTimestampOrder`] (picoseconds)
const FRACTION_DIGITS: u32 = 12;

/// Maps a record to the key it is sorted by (smallest released first)
pub trait RecordOrder: Send + Sync + 'static {
    /// Sort key
    type Key: Ord + Send;

    /// Compute the sort key for a record
    fn key(&self, record: &Record) -> Self::Key;
}

/// Plain string comparison of the whole record
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOrder;

impl RecordOrder for LexicalOrder {
    type Key = Record;

    fn key(&self, record: &Record) -> Record {
        record.clone()
    }
}

/// Numeric comparison of the leading `seconds.fraction` field.
///
/// Ties and unparsable records fall back to text order; unparsable records
/// sort before every parsable one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadingTimestampOrder;

impl RecordOrder for LeadingTimestampOrder {
    type Key = (Option<i128>, Record);

    fn key(&self, record: &Record) -> Self::Key {
        let stamp = record
            .as_str()
            .split_whitespace()
            .next()
            .and_then(parse_picoseconds);
        (stamp, record.clone())
    }
}

/// Parse `[-]secs[.frac]` into picoseconds; digits past 12 are truncated
fn parse_picoseconds(field: &str) -> Option<i128> {
    let (negative, digits) = match field.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, field.strip_prefix('+').unwrap_or(field)),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i128 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let mut frac_value: i128 = 0;
    let mut used = 0;
    for b in frac.bytes().take(FRACTION_DIGITS as usize) {
        frac_value = frac_value * 10 + i128::from(b - b'0');
        used += 1;
    }
    frac_value *= 10i128.pow(FRACTION_DIGITS - used);

    let value = whole
        .checked_mul(10i128.pow(FRACTION_DIGITS))?
        .checked_add(frac_value)?;
    Some(if negative { -value } else { value })
}

/// Order selected in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// [`LexicalOrder`]
    #[default]
    Lexical,
    /// [`LeadingTimestampOrder`]
    Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LineVerdict;

    fn record(text: &str) -> Record {
        match Record::classify(text) {
            LineVerdict::Accepted(r) => r,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_picoseconds() {
        assert_eq!(parse_picoseconds("1.5"), Some(1_500_000_000_000));
        assert_eq!(parse_picoseconds("12"), Some(12_000_000_000_000));
        assert_eq!(parse_picoseconds(".000000000001"), Some(1));
        assert_eq!(parse_picoseconds("-0.25"), Some(-250_000_000_000));
        // Sub-picosecond digits are truncated
        assert_eq!(parse_picoseconds("0.0000000000019"), Some(1));
        assert_eq!(parse_picoseconds("chA"), None);
        assert_eq!(parse_picoseconds("1.2.3"), None);
        assert_eq!(parse_picoseconds("."), None);
    }

    #[test]
    fn test_lexical_vs_timestamp() {
        // Different integer widths: lexical order gets this wrong
        let early = record("999.500000000000 chA ........");
        let late = record("1000.100000000000 chB .......");

        assert!(LexicalOrder.key(&late) < LexicalOrder.key(&early));
        assert!(LeadingTimestampOrder.key(&early) < LeadingTimestampOrder.key(&late));
    }

    #[test]
    fn test_timestamp_unparsable_sorts_first() {
        let garbage = record("TICC v20191217 started ok");
        let stamp = record("1623091234.001 1.000e-09 chA");
        assert!(LeadingTimestampOrder.key(&garbage) < LeadingTimestampOrder.key(&stamp));
    }

    #[test]
    fn test_order_kind_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            order: OrderKind,
        }
        let w: Wrapper = toml::from_str("order = \"timestamp\"").unwrap();
        assert_eq!(w.order, OrderKind::Timestamp);
        let w: Wrapper = toml::from_str("order = \"lexical\"").unwrap();
        assert_eq!(w.order, OrderKind::Lexical);
    }
}
