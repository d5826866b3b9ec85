//! Telegram Bot API: Stars invoice links and customer notifications.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shop_schemas::{mask_half, InlineButton, InvoiceType, Keyboard, ProviderCheckout};

use crate::checkout::{CheckoutClient, InvoiceRequest};
use crate::notify::Notifier;
use crate::{constant_time_eq, truncate_body, ProviderError};

/// Header carrying the `secret_token` registered with `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Wire currency of Stars payments.
pub const STARS_CURRENCY: &str = "XTR";

/// Bot API client. The token is part of every URL; never log URLs from here.
#[derive(Clone)]
pub struct TelegramBot {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct LabeledPrice<'a> {
    label: &'a str,
    amount: i64,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceLink<'a> {
    title: &'a str,
    description: &'a str,
    payload: &'a str,
    currency: &'a str,
    prices: Vec<LabeledPrice<'a>>,
}

impl TelegramBot {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.token,
            method
        );
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let parsed: BotResponse<T> = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message: truncate_body(&text),
                })
            }
            Err(e) => return Err(e.into()),
        };

        match parsed {
            BotResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            BotResponse {
                error_code,
                description,
                ..
            } => Err(ProviderError::Api {
                status: error_code.unwrap_or(status.as_u16()),
                message: format!(
                    "{method}: {}",
                    description.unwrap_or_else(|| "unknown".to_string())
                ),
            }),
        }
    }
}

/// Bot API `reply_markup` for an inline keyboard.
pub fn reply_markup(keyboard: &Keyboard) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = keyboard
        .rows
        .iter()
        .map(|row| row.iter().map(button_json).collect())
        .collect();
    json!({ "inline_keyboard": rows })
}

fn button_json(b: &InlineButton) -> serde_json::Value {
    match (&b.web_app_url, &b.callback_data) {
        (Some(url), _) => json!({ "text": b.text, "web_app": { "url": url } }),
        (None, Some(data)) => json!({ "text": b.text, "callback_data": data }),
        (None, None) => json!({ "text": b.text, "callback_data": "" }),
    }
}

#[async_trait]
impl CheckoutClient for TelegramBot {
    fn invoice_type(&self) -> InvoiceType {
        InvoiceType::Telegram
    }

    async fn create_invoice(&self, req: &InvoiceRequest) -> Result<ProviderCheckout, ProviderError> {
        let payload = format!("{}&{}", req.purchase_id, req.username);
        let body = CreateInvoiceLink {
            title: &req.title,
            description: &req.description,
            payload: &payload,
            currency: STARS_CURRENCY,
            prices: vec![LabeledPrice {
                label: &req.label,
                amount: req.amount,
            }],
        };

        let link: String = self.call("createInvoiceLink", &body).await?;
        tracing::info!(purchase_id = %mask_half(req.purchase_id), "stars invoice link created");

        Ok(ProviderCheckout {
            external_id: payload,
            status: "pending".to_string(),
            redirect_url: link,
            amount: req.amount,
            currency: "STARS".to_string(),
            country: None,
        })
    }
}

#[async_trait]
impl Notifier for TelegramBot {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ProviderError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(k) = keyboard {
            body["reply_markup"] = reply_markup(k);
        }
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ProviderError> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self.call("deleteMessage", &body).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    successful_payment: Option<SuccessfulPayment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuccessfulPayment {
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    #[serde(default)]
    pub telegram_payment_charge_id: String,
}

/// A decoded `successful_payment` with the purchase id taken from its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarsPayment {
    pub purchase_id: i64,
    pub total_amount: i64,
    pub currency: String,
}

/// `true` when the webhook request carries the configured secret token.
pub fn verify_secret_token(expected: &str, presented: Option<&str>) -> bool {
    match presented {
        Some(p) if !expected.is_empty() => constant_time_eq(expected.as_bytes(), p.as_bytes()),
        _ => false,
    }
}

/// The payment of an update carrying `successful_payment`; `None` otherwise.
pub fn parse_successful_payment(body: &[u8]) -> Result<Option<StarsPayment>, ProviderError> {
    let update: Update = serde_json::from_slice(body)?;
    let Some(p) = update.message.and_then(|m| m.successful_payment) else {
        return Ok(None);
    };
    Ok(Some(StarsPayment {
        purchase_id: parse_stars_payload(&p.invoice_payload)?,
        total_amount: p.total_amount,
        currency: p.currency,
    }))
}

/// `<purchaseId>&<username>` -> id.
pub fn parse_stars_payload(payload: &str) -> Result<i64, ProviderError> {
    payload
        .split('&')
        .next()
        .and_then(|id| id.parse::<i64>().ok())
        .ok_or_else(|| ProviderError::Decode(format!("bad stars payload: {payload}")))
}
