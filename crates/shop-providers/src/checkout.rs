use async_trait::async_trait;
use shop_schemas::{InvoiceType, ProviderCheckout};

use crate::ProviderError;

/// Everything an adapter needs to open a remote invoice for one purchase.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub purchase_id: i64,
    pub customer_id: i64,
    /// Ledger amount in the ledger currency of the invoice type.
    pub amount: i64,
    pub currency: String,
    pub months: i32,
    /// Localized invoice texts (used by Telegram Stars).
    pub title: String,
    pub label: String,
    pub description: String,
    /// Chat username, embedded in provider payloads.
    pub username: String,
}

/// A provider that can open a checkout/invoice.
#[async_trait]
pub trait CheckoutClient: Send + Sync {
    fn invoice_type(&self) -> InvoiceType;

    async fn create_invoice(&self, req: &InvoiceRequest) -> Result<ProviderCheckout, ProviderError>;
}

/// Remote checkout state as reported by a pollable provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutStatus {
    pub checkout_id: String,
    pub status: String,
    pub payment_status: Option<String>,
}

impl CheckoutStatus {
    /// Paid when the checkout completed or its payment closed.
    pub fn is_paid(&self) -> bool {
        self.status == "COMPLETED" || self.payment_status.as_deref() == Some("CLO")
    }
}

/// A provider whose checkout status can be queried (Rapyd).
#[async_trait]
pub trait CheckoutStatusSource: Send + Sync {
    async fn checkout_status(&self, checkout_id: &str) -> Result<CheckoutStatus, ProviderError>;
}

/// A provider's own record of one payment, fetched by the provider payment id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePayment {
    pub payment_id: String,
    pub succeeded: bool,
    /// Purchase id echoed back from the metadata we attached.
    pub purchase_id: Option<i64>,
    /// Whole units of `currency`; `None` when the amount has a fractional part.
    pub amount: Option<i64>,
    pub currency: String,
}

/// A provider whose payments can be re-fetched to confirm a callback (YooKassa).
#[async_trait]
pub trait PaymentLookup: Send + Sync {
    fn invoice_type(&self) -> InvoiceType;

    async fn fetch_payment(&self, payment_id: &str) -> Result<RemotePayment, ProviderError>;
}

/// `"100.00"` -> `Some(100)`; `"99.50"` or garbage -> `None`.
pub fn parse_whole_units(value: &str) -> Option<i64> {
    let (units, fraction) = value.split_once('.').unwrap_or((value, ""));
    if !fraction.chars().all(|c| c == '0') {
        return None;
    }
    units.parse().ok()
}
