//! shop-schemas
//!
//! Domain records shared by every shop crate: customers, purchases, referrals,
//! and the ephemeral checkout a provider hands back. The purchase lifecycle
//! (`PurchaseStatus`) lives here so stores and the payment core agree on which
//! transitions are legal.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// InvoiceType
// ---------------------------------------------------------------------------

/// The closed set of payment providers a purchase can be settled through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    /// CryptoPay bot invoices (USDT).
    Crypto,
    /// YooKassa redirect checkout (RUB).
    Yookasa,
    /// Telegram Stars invoice link.
    Telegram,
    /// Rapyd hosted checkout with country/currency negotiation.
    Rapyd,
}

impl InvoiceType {
    pub const ALL: [InvoiceType; 4] = [
        InvoiceType::Crypto,
        InvoiceType::Yookasa,
        InvoiceType::Telegram,
        InvoiceType::Rapyd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Crypto => "crypto",
            InvoiceType::Yookasa => "yookasa",
            InvoiceType::Telegram => "telegram",
            InvoiceType::Rapyd => "rapyd",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crypto" => Ok(InvoiceType::Crypto),
            "yookasa" | "yookassa" => Ok(InvoiceType::Yookasa),
            "telegram" | "stars" => Ok(InvoiceType::Telegram),
            "rapyd" => Ok(InvoiceType::Rapyd),
            other => Err(anyhow!("unknown invoice type: {}", other)),
        }
    }

    /// Currency recorded on the ledger row when the purchase is opened.
    pub fn ledger_currency(&self) -> &'static str {
        match self {
            InvoiceType::Crypto => "USD",
            InvoiceType::Yookasa => "RUB",
            InvoiceType::Telegram => "STARS",
            InvoiceType::Rapyd => "USD",
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PurchaseStatus
// ---------------------------------------------------------------------------

/// Purchase lifecycle.
///
/// ```text
///   New ──(checkout created)──► Pending ──(payment confirmed)──► Paid
///    │                            │
///    └────────(cancel)────────────┴──────────────────────────► Cancel
/// ```
///
/// `Paid` and `Cancel` are terminal. `New -> Paid` is legal: a confirmed
/// payment wins even if the correlation write never landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    New,
    Pending,
    Paid,
    Cancel,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::New => "new",
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Cancel => "cancel",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(PurchaseStatus::New),
            "pending" => Ok(PurchaseStatus::Pending),
            "paid" => Ok(PurchaseStatus::Paid),
            "cancel" => Ok(PurchaseStatus::Cancel),
            other => Err(anyhow!("invalid purchase status: {}", other)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStatus::Paid | PurchaseStatus::Cancel)
    }

    pub fn can_transition_to(&self, next: PurchaseStatus) -> bool {
        use PurchaseStatus::*;
        matches!(
            (self, next),
            (New, Pending) | (New, Paid) | (Pending, Paid) | (New, Cancel) | (Pending, Cancel)
        )
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Purchase
// ---------------------------------------------------------------------------

/// Provider-side reference for a purchase: the remote id plus the URL the
/// customer is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub external_id: String,
    pub external_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub customer_id: i64,
    pub invoice_type: InvoiceType,
    pub status: PurchaseStatus,
    /// Whole units of `currency` (no minor units).
    pub amount: i64,
    pub currency: String,
    pub months: i32,
    /// At most one correlation pair, always belonging to `invoice_type`.
    pub correlation: Option<Correlation>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Purchase {
    pub fn external_id(&self) -> Option<&str> {
        self.correlation
            .as_ref()
            .map(|c| c.external_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Entitlement length bought by this purchase.
    pub fn entitlement_days(&self) -> i64 {
        i64::from(self.months) * 30
    }
}

/// Insert payload for a purchase opened in `New`.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub customer_id: i64,
    pub invoice_type: InvoiceType,
    pub amount: i64,
    pub currency: String,
    pub months: i32,
}

// ---------------------------------------------------------------------------
// Customer / entitlement / referral
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    /// Chat-platform (Telegram) id; also the chat id for notifications.
    pub telegram_id: i64,
    pub language: String,
    pub subscription_link: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
}

/// Access credential returned by the entitlement panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub subscription_url: String,
    pub expire_at: DateTime<Utc>,
}

/// Referral edge between two chat-platform ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: i64,
    pub referrer_id: i64,
    pub referee_id: i64,
    pub bonus_granted: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ProviderCheckout
// ---------------------------------------------------------------------------

/// What a provider returns after a checkout/invoice was created.
///
/// `amount`/`currency` are the figures the customer is actually charged in,
/// which may differ from the ledger row after currency negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCheckout {
    pub external_id: String,
    pub status: String,
    pub redirect_url: String,
    pub amount: i64,
    pub currency: String,
    /// Settlement country chosen by negotiation (Rapyd only).
    pub country: Option<String>,
}

impl ProviderCheckout {
    pub fn correlation(&self) -> Correlation {
        Correlation {
            external_id: self.external_id.clone(),
            external_url: self.redirect_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Keyboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: Option<String>,
    pub web_app_url: Option<String>,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            web_app_url: None,
        }
    }

    pub fn web_app(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            web_app_url: Some(url.into()),
        }
    }
}

/// Inline keyboard: rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

// ---------------------------------------------------------------------------
// Log masking
// ---------------------------------------------------------------------------

/// Render an id for logs with the trailing half of its digits hidden.
pub fn mask_half(id: i64) -> String {
    let s = id.to_string();
    let digits = s.trim_start_matches('-');
    let keep = digits.len() - digits.len() / 2;
    let sign = if id < 0 { "-" } else { "" };
    format!("{sign}{}{}", &digits[..keep], "*".repeat(digits.len() - keep))
}
