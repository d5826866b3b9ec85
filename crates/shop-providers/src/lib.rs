//! shop-providers
//!
//! Outbound integrations of the shop: the four checkout providers, the
//! Remnawave entitlement panel, and the Telegram Bot API used for
//! notifications. Each integration sits behind a small trait so the payment
//! core can be driven by in-memory fakes.

pub mod checkout;
pub mod cryptopay;
pub mod entitlement;
pub mod error;
pub mod notify;
pub mod rapyd;
pub mod rates;
pub mod remnawave;
pub mod telegram;
pub mod yookassa;

use std::time::Duration;

pub use checkout::{
    CheckoutClient, CheckoutStatus, CheckoutStatusSource, InvoiceRequest, PaymentLookup,
    RemotePayment,
};
pub use entitlement::EntitlementProvider;
pub use error::ProviderError;
pub use notify::Notifier;
pub use rates::{convert_amount, RateSource, StaticRateTable};

/// Shared HTTP client; every outbound call carries `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Config(format!("http client build failed: {e}")))
}

/// Compare a presented shared secret with the configured one without
/// leaking the position of the first differing byte.
pub fn constant_time_eq(expected: &[u8], presented: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if expected.len() != presented.len() {
        return false;
    }
    expected.ct_eq(presented).into()
}

/// Upstream bodies are echoed into errors; keep them short.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
