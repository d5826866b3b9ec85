//! Country/currency negotiation.
//!
//! Rapyd checkouts need a country whose card methods accept the currency.
//! Candidates are tried in order; the first with an active card method wins.
//! When none does, the checkout falls back to EUR in DE.

use async_trait::async_trait;

use crate::rapyd::models::PaymentMethodDetails;
use crate::rates::{convert_amount, RateSource};
use crate::ProviderError;

pub const FALLBACK_COUNTRY: &str = "DE";
pub const FALLBACK_CURRENCY: &str = "EUR";

/// Lists the payment methods available in a country for a currency.
#[async_trait]
pub trait PaymentMethodSource: Send + Sync {
    async fn payment_methods(
        &self,
        country: &str,
        currency: &str,
    ) -> Result<Vec<PaymentMethodDetails>, ProviderError>;
}

/// Candidate settlement countries for `currency`, most preferred first.
pub fn candidate_countries(currency: &str) -> &'static [&'static str] {
    match currency {
        "USD" => &["GB", "DE", "CA", "AU", "SG"],
        "EUR" => &["DE", "FR", "IT", "ES", "NL", "BE", "AT", "FI", "IE", "PT", "GR"],
        "GBP" => &["GB", "IE"],
        "ILS" => &["IL"],
        "CAD" => &["CA", "US"],
        "AUD" => &["AU", "NZ", "US"],
        "JPY" => &["JP", "US"],
        "SGD" => &["SG", "MY", "US"],
        _ => &["US", "GB", "DE", "CA", "AU"],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub country: String,
    pub currency: String,
    pub amount: i64,
    pub fell_back: bool,
}

/// Pick the country/currency/amount to charge.
///
/// `base_amount` is in USD. Per-country lookup failures are logged and
/// skipped; negotiation itself never fails.
pub async fn negotiate(
    methods: &dyn PaymentMethodSource,
    rates: &dyn RateSource,
    currency: &str,
    base_amount: i64,
) -> Negotiated {
    let amount = convert_amount(rates, base_amount, currency);

    for country in candidate_countries(currency) {
        let found = match methods.payment_methods(country, currency).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(country, currency, error = %e, "rapyd payment method lookup failed");
                continue;
            }
        };

        let cards = found.iter().filter(|m| m.is_active_card()).count();
        if cards > 0 {
            tracing::info!(country, currency, cards, "rapyd country selected");
            return Negotiated {
                country: country.to_string(),
                currency: currency.to_string(),
                amount,
                fell_back: false,
            };
        }
    }

    let amount = convert_amount(rates, base_amount, FALLBACK_CURRENCY);
    tracing::warn!(
        requested = currency,
        amount,
        "no rapyd country accepts the currency, falling back to EUR/DE"
    );
    Negotiated {
        country: FALLBACK_COUNTRY.to_string(),
        currency: FALLBACK_CURRENCY.to_string(),
        amount,
        fell_back: true,
    }
}
