//! Exchange rates used to present a USD-based price in another currency.

use std::collections::HashMap;

/// Units of `currency` per one USD.
pub trait RateSource: Send + Sync {
    fn rate(&self, currency: &str) -> Option<f64>;
}

/// Fixed table; good enough for presentation, not for settlement.
#[derive(Debug, Clone)]
pub struct StaticRateTable {
    rates: HashMap<&'static str, f64>,
}

const STATIC_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.85),
    ("GBP", 0.75),
    ("ILS", 3.7),
    ("CAD", 1.35),
    ("AUD", 1.5),
    ("JPY", 150.0),
    ("SGD", 1.35),
    ("SEK", 10.5),
    ("NOK", 10.8),
    ("DKK", 6.8),
    ("CHF", 0.9),
    ("PLN", 4.0),
    ("CZK", 23.0),
    ("HUF", 360.0),
    ("RON", 4.6),
    ("BGN", 1.8),
    ("HRK", 6.8),
    ("MXN", 17.0),
    ("BRL", 5.0),
    ("ZAR", 18.0),
    ("RUB", 75.0),
    ("UAH", 36.0),
    ("INR", 83.0),
    ("KRW", 1300.0),
    ("TWD", 31.0),
    ("THB", 35.0),
    ("MYR", 4.6),
    ("IDR", 15000.0),
    ("PHP", 55.0),
];

/// Currencies without a minor unit.
const ZERO_DECIMAL: &[&str] = &["JPY", "KRW", "IDR"];

impl Default for StaticRateTable {
    fn default() -> Self {
        Self {
            rates: STATIC_RATES.iter().copied().collect(),
        }
    }
}

impl RateSource for StaticRateTable {
    fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }
}

/// Convert a whole-unit USD amount into `currency`.
///
/// Unknown currencies return the amount unchanged.
pub fn convert_amount(rates: &dyn RateSource, amount_usd: i64, currency: &str) -> i64 {
    let Some(rate) = rates.rate(currency) else {
        tracing::warn!(currency, "unknown currency, amount left unconverted");
        return amount_usd;
    };

    let converted = amount_usd as f64 * rate;
    if ZERO_DECIMAL.contains(&currency) {
        converted.round() as i64
    } else {
        (converted + 0.5).floor() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_with_half_up_rounding() {
        let t = StaticRateTable::default();
        assert_eq!(convert_amount(&t, 10, "USD"), 10);
        // 10 * 0.85 = 8.5 -> 9
        assert_eq!(convert_amount(&t, 10, "EUR"), 9);
        // 3 * 0.75 = 2.25 -> 2
        assert_eq!(convert_amount(&t, 3, "GBP"), 2);
        assert_eq!(convert_amount(&t, 5, "ILS"), 19);
    }

    #[test]
    fn zero_decimal_currencies_round_to_whole_units() {
        let t = StaticRateTable::default();
        assert_eq!(convert_amount(&t, 3, "JPY"), 450);
        assert_eq!(convert_amount(&t, 2, "KRW"), 2600);
        assert_eq!(convert_amount(&t, 1, "IDR"), 15000);
    }

    #[test]
    fn unknown_currency_is_unchanged() {
        let t = StaticRateTable::default();
        assert_eq!(convert_amount(&t, 42, "XYZ"), 42);
    }
}
