//! YooKassa redirect payments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shop_schemas::{mask_half, InvoiceType, ProviderCheckout};
use uuid::Uuid;

use crate::checkout::{parse_whole_units, CheckoutClient, InvoiceRequest, PaymentLookup, RemotePayment};
use crate::{truncate_body, ProviderError};

#[derive(Clone)]
pub struct YookassaClient {
    http: reqwest::Client,
    base_url: String,
    shop_id: String,
    secret_key: String,
    return_url: String,
}

impl YookassaClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        shop_id: impl Into<String>,
        secret_key: impl Into<String>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            shop_id: shop_id.into(),
            secret_key: secret_key.into(),
            return_url: return_url.into(),
        }
    }

    fn payments_url(&self) -> String {
        format!("{}/v3/payments", self.base_url.trim_end_matches('/'))
    }

    async fn read(resp: reqwest::Response) -> Result<Payment, ProviderError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: truncate_body(&text),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Serialize)]
struct Amount {
    value: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct Confirmation<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    return_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentMetadata {
    customer_id: String,
    purchase_id: String,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    amount: Amount,
    capture: bool,
    confirmation: Confirmation<'a>,
    description: String,
    metadata: PaymentMetadata,
}

#[derive(Debug, Deserialize)]
struct Payment {
    id: String,
    #[serde(default)]
    status: String,
    confirmation: Option<PaymentConfirmation>,
    amount: Option<PaymentAmount>,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentAmount {
    value: String,
    currency: String,
}

fn metadata_purchase_id(metadata: &serde_json::Map<String, Value>) -> Option<i64> {
    match metadata.get("purchaseId") {
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        Some(Value::Number(v)) => v.as_i64(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct PaymentConfirmation {
    #[serde(default)]
    confirmation_url: String,
}

#[async_trait]
impl CheckoutClient for YookassaClient {
    fn invoice_type(&self) -> InvoiceType {
        InvoiceType::Yookasa
    }

    async fn create_invoice(&self, req: &InvoiceRequest) -> Result<ProviderCheckout, ProviderError> {
        let body = CreatePaymentBody {
            amount: Amount {
                value: format!("{}.00", req.amount),
                currency: "RUB".to_string(),
            },
            capture: true,
            confirmation: Confirmation {
                kind: "redirect",
                return_url: &self.return_url,
            },
            description: format!("Subscription for {} month", req.months),
            metadata: PaymentMetadata {
                customer_id: req.customer_id.to_string(),
                purchase_id: req.purchase_id.to_string(),
            },
        };

        let resp = self
            .http
            .post(self.payments_url())
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;
        let payment = Self::read(resp).await?;
        let redirect_url = payment
            .confirmation
            .map(|c| c.confirmation_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::Decode("yookassa payment without confirmation url".to_string()))?;

        tracing::info!(
            purchase_id = %mask_half(req.purchase_id),
            payment_id = %payment.id,
            "yookassa payment created"
        );

        Ok(ProviderCheckout {
            external_id: payment.id,
            status: payment.status,
            redirect_url,
            amount: req.amount,
            currency: "RUB".to_string(),
            country: None,
        })
    }
}

#[async_trait]
impl PaymentLookup for YookassaClient {
    fn invoice_type(&self) -> InvoiceType {
        InvoiceType::Yookasa
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<RemotePayment, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/{payment_id}", self.payments_url()))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?;
        let payment = Self::read(resp).await?;
        let (amount, currency) = match payment.amount {
            Some(a) => (parse_whole_units(&a.value), a.currency),
            None => (None, String::new()),
        };

        Ok(RemotePayment {
            purchase_id: metadata_purchase_id(&payment.metadata),
            succeeded: payment.status == "succeeded",
            payment_id: payment.id,
            amount,
            currency,
        })
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Notification {
    event: String,
    object: NotificationObject,
}

#[derive(Debug, Deserialize)]
struct NotificationObject {
    #[serde(default)]
    id: String,
}

/// Payment id of a `payment.succeeded` notification; `None` for other events.
///
/// Notifications are unsigned. The id only says which payment to re-fetch
/// with [`PaymentLookup::fetch_payment`]; nothing else in the body is trusted.
pub fn parse_succeeded_notification(body: &[u8]) -> Result<Option<String>, ProviderError> {
    let n: Notification = serde_json::from_slice(body)?;
    if n.event != "payment.succeeded" {
        return Ok(None);
    }
    if n.object.id.is_empty() {
        return Err(ProviderError::Decode(
            "yookassa notification without payment id".to_string(),
        ));
    }
    Ok(Some(n.object.id))
}
