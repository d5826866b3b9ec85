//! CryptoPay (Crypto Bot) invoices and webhooks.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shop_schemas::{mask_half, InvoiceType, ProviderCheckout};

use crate::checkout::{CheckoutClient, InvoiceRequest};
use crate::{truncate_body, ProviderError};

pub const SIGNATURE_HEADER: &str = "crypto-pay-api-signature";

#[derive(Clone)]
pub struct CryptoPayClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    /// Target of the "paid" button shown by Crypto Bot.
    bot_url: String,
}

impl CryptoPayClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        bot_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            bot_url: bot_url.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    currency_type: &'a str,
    fiat: &'a str,
    amount: String,
    accepted_assets: &'a str,
    payload: String,
    description: String,
    paid_btn_name: &'a str,
    paid_btn_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub invoice_id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub bot_invoice_url: String,
    #[serde(default)]
    pub payload: Option<String>,
}

#[async_trait]
impl CheckoutClient for CryptoPayClient {
    fn invoice_type(&self) -> InvoiceType {
        InvoiceType::Crypto
    }

    async fn create_invoice(&self, req: &InvoiceRequest) -> Result<ProviderCheckout, ProviderError> {
        let body = CreateInvoiceBody {
            currency_type: "fiat",
            fiat: "USD",
            amount: req.amount.to_string(),
            accepted_assets: "USDT",
            payload: format!("purchaseId={}&username={}", req.purchase_id, req.username),
            description: format!("Subscription for {} month", req.months),
            paid_btn_name: "callback",
            paid_btn_url: &self.bot_url,
        };

        let url = format!("{}/api/createInvoice", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .header("Crypto-Pay-API-Token", &self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let parsed: ApiResponse<Invoice> = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message: truncate_body(&text),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let invoice = match parsed {
            ApiResponse {
                ok: true,
                result: Some(invoice),
                ..
            } => invoice,
            ApiResponse { error, .. } => {
                let message = error
                    .map(|e| format!("{} {}", e.code, e.name))
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
        };

        tracing::info!(
            purchase_id = %mask_half(req.purchase_id),
            invoice_id = invoice.invoice_id,
            "cryptopay invoice created"
        );

        Ok(ProviderCheckout {
            external_id: invoice.invoice_id.to_string(),
            status: invoice.status,
            redirect_url: invoice.bot_invoice_url,
            amount: req.amount,
            currency: "USD".to_string(),
            country: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// Check `crypto-pay-api-signature`: hex HMAC-SHA256 of the raw body keyed by
/// SHA-256 of the API token.
pub fn verify_webhook_signature(token: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let key = Sha256::digest(token.as_bytes());
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&key) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
pub struct WebhookUpdate {
    #[serde(default)]
    pub update_id: i64,
    pub update_type: String,
    pub payload: Invoice,
}

/// Purchase id carried by an `invoice_paid` update; `None` for other updates.
pub fn parse_paid_webhook(body: &[u8]) -> Result<Option<i64>, ProviderError> {
    let update: WebhookUpdate = serde_json::from_slice(body)?;
    if update.update_type != "invoice_paid" {
        return Ok(None);
    }
    let payload = update
        .payload
        .payload
        .as_deref()
        .ok_or_else(|| ProviderError::Decode("cryptopay invoice without payload".to_string()))?;
    parse_invoice_payload(payload).map(Some)
}

/// `purchaseId=<id>&username=<name>` -> id.
pub fn parse_invoice_payload(payload: &str) -> Result<i64, ProviderError> {
    payload
        .split('&')
        .find_map(|kv| kv.strip_prefix("purchaseId="))
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| ProviderError::Decode(format!("bad cryptopay payload: {payload}")))
}
