//! Money value object.
//!
//! All provider-native amount representations are converted to `Money` at the
//! event normalizer boundary; nothing downstream ever sees a provider-native
//! amount format.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An amount in integer minor units (e.g. cents) with a lowercase currency code.
///
/// Integer minor units avoid floating-point money errors; the lowercase
/// currency code gives both providers a single canonical spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (cents, pence, ...).
    pub minor_units: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
}

impl Money {
    /// Create from an amount already in minor units (the Stripe representation).
    ///
    /// The currency is lowercased; a missing currency defaults to `usd`.
    #[must_use]
    pub fn from_minor_units(minor_units: i64, currency: Option<&str>) -> Self {
        Self {
            minor_units,
            currency: normalize_currency(currency),
        }
    }

    /// Parse a decimal-string amount (the PayPal representation).
    ///
    /// The value is multiplied by 100 and rounded to the nearest minor unit.
    /// A missing or unparseable value yields `0` — never a NaN or an error,
    /// so a malformed amount field degrades to a zero-amount event instead of
    /// failing the whole delivery.
    #[must_use]
    pub fn parse_decimal(value: Option<&str>, currency: Option<&str>) -> Self {
        let minor_units = value
            .and_then(|v| Decimal::from_str(v.trim()).ok())
            .map(|d| {
                (d * Decimal::from(100))
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            })
            .and_then(|d| d.to_i64())
            .unwrap_or(0);

        Self {
            minor_units,
            currency: normalize_currency(currency),
        }
    }

    /// A zero amount in the default currency.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            minor_units: 0,
            currency: "usd".to_string(),
        }
    }
}

fn normalize_currency(currency: Option<&str>) -> String {
    match currency {
        Some(c) if !c.trim().is_empty() => c.trim().to_lowercase(),
        _ => "usd".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor_units_passes_through() {
        let money = Money::from_minor_units(5000, Some("GBP"));
        assert_eq!(money.minor_units, 5000);
        assert_eq!(money.currency, "gbp");
    }

    #[test]
    fn test_from_minor_units_default_currency() {
        let money = Money::from_minor_units(100, None);
        assert_eq!(money.currency, "usd");

        let money = Money::from_minor_units(100, Some(""));
        assert_eq!(money.currency, "usd");
    }

    #[test]
    fn test_parse_decimal() {
        let money = Money::parse_decimal(Some("25.50"), Some("USD"));
        assert_eq!(money.minor_units, 2550);
        assert_eq!(money.currency, "usd");
    }

    #[test]
    fn test_parse_decimal_whole_number() {
        let money = Money::parse_decimal(Some("100"), Some("eur"));
        assert_eq!(money.minor_units, 10000);
    }

    #[test]
    fn test_parse_decimal_rounds_to_nearest() {
        // Sub-cent precision rounds half away from zero.
        assert_eq!(Money::parse_decimal(Some("0.005"), None).minor_units, 1);
        assert_eq!(Money::parse_decimal(Some("1.004"), None).minor_units, 100);
        assert_eq!(Money::parse_decimal(Some("1.006"), None).minor_units, 101);
    }

    #[test]
    fn test_parse_decimal_failure_yields_zero() {
        assert_eq!(Money::parse_decimal(Some("not-a-number"), None).minor_units, 0);
        assert_eq!(Money::parse_decimal(Some(""), None).minor_units, 0);
        assert_eq!(Money::parse_decimal(None, None).minor_units, 0);
    }

    #[test]
    fn test_parse_decimal_trims_whitespace() {
        assert_eq!(Money::parse_decimal(Some(" 12.34 "), None).minor_units, 1234);
    }

    #[test]
    fn test_zero() {
        let money = Money::zero();
        assert_eq!(money.minor_units, 0);
        assert_eq!(money.currency, "usd");
    }
}
