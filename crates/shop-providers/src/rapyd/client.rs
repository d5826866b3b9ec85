use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use shop_schemas::{mask_half, InvoiceType, ProviderCheckout};

use crate::checkout::{CheckoutClient, CheckoutStatus, CheckoutStatusSource, InvoiceRequest};
use crate::rapyd::models::{
    CheckoutData, CreateCheckoutRequest, Envelope, PaymentMethodDetails, PaymentMethodRef,
};
use crate::rapyd::negotiate::{negotiate, PaymentMethodSource};
use crate::rapyd::signing::{generate_salt, sign, SignInput};
use crate::rates::RateSource;
use crate::{truncate_body, ProviderError};

const CHECKOUT_CATEGORIES: [&str; 3] = ["card", "bank_transfer", "ewallet"];

/// Rapyd hosted-checkout client.
///
/// Keys are passed in by the caller; neither they nor the signature are logged.
#[derive(Clone)]
pub struct RapydClient {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
    secret_key: String,
    /// Currency offered before negotiation.
    presentation_currency: String,
    /// Where the customer lands after paying or cancelling.
    return_url: Option<String>,
    rates: Arc<dyn RateSource>,
}

impl RapydClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        rates: Arc<dyn RateSource>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            presentation_currency: "USD".to_string(),
            return_url: None,
            rates,
        }
    }

    pub fn with_presentation_currency(mut self, currency: impl Into<String>) -> Self {
        self.presentation_currency = currency.into();
        self
    }

    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.return_url = (!url.is_empty()).then_some(url);
        self
    }

    /// Send a signed request. `path` includes any query string.
    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<T, ProviderError> {
        let body = body.unwrap_or_default();
        let salt = generate_salt();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &SignInput {
                method: method.as_str(),
                path,
                salt: &salt,
                timestamp: &timestamp,
                body: &body,
            },
            &self.access_key,
            &self.secret_key,
        )?;

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self
            .http
            .request(method.clone(), url)
            .header("Content-Type", "application/json")
            .header("access_key", &self.access_key)
            .header("signature", signature)
            .header("timestamp", timestamp)
            .header("salt", salt);
        if !body.is_empty() {
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<Envelope<serde_json::Value>>(&text) {
                Ok(env) if !env.status.error_code.is_empty() => {
                    format!("{} - {}", env.status.error_code, env.status.message)
                }
                _ => truncate_body(&text),
            };
            tracing::warn!(method = %method, path, status = status.as_u16(), "rapyd request rejected");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let env: Envelope<T> = serde_json::from_str(&text)?;
        env.data
            .ok_or_else(|| ProviderError::Decode(format!("rapyd response without data: {path}")))
    }
}

#[async_trait]
impl PaymentMethodSource for RapydClient {
    async fn payment_methods(
        &self,
        country: &str,
        currency: &str,
    ) -> Result<Vec<PaymentMethodDetails>, ProviderError> {
        let path = format!("/v1/payment_methods/countries/{country}?currency={currency}");
        self.send_signed(Method::GET, &path, None).await
    }
}

#[async_trait]
impl CheckoutStatusSource for RapydClient {
    async fn checkout_status(&self, checkout_id: &str) -> Result<CheckoutStatus, ProviderError> {
        let path = format!("/v1/checkout/{checkout_id}");
        let data: CheckoutData = self.send_signed(Method::GET, &path, None).await?;

        let status = CheckoutStatus {
            checkout_id: data.id,
            status: data.status,
            payment_status: data.payment.map(|p| p.status).filter(|s| !s.is_empty()),
        };
        tracing::info!(
            checkout_id = %status.checkout_id,
            status = %status.status,
            payment_status = status.payment_status.as_deref().unwrap_or("no_payment"),
            "rapyd checkout status"
        );
        Ok(status)
    }
}

#[async_trait]
impl CheckoutClient for RapydClient {
    fn invoice_type(&self) -> InvoiceType {
        InvoiceType::Rapyd
    }

    async fn create_invoice(&self, req: &InvoiceRequest) -> Result<ProviderCheckout, ProviderError> {
        let chosen = negotiate(
            self,
            self.rates.as_ref(),
            &self.presentation_currency,
            req.amount,
        )
        .await;

        let mut metadata = BTreeMap::new();
        metadata.insert("customer_id".to_string(), req.customer_id.to_string());
        metadata.insert("purchase_id".to_string(), req.purchase_id.to_string());
        metadata.insert("currency_requested".to_string(), chosen.currency.clone());
        metadata.insert("country_selected".to_string(), chosen.country.clone());
        metadata.insert("base_amount".to_string(), req.amount.to_string());
        metadata.insert("base_currency".to_string(), req.currency.clone());

        let body = CreateCheckoutRequest {
            amount: chosen.amount,
            currency: chosen.currency.clone(),
            country: chosen.country.clone(),
            payment_method: PaymentMethodRef {
                kind: "any".to_string(),
            },
            metadata,
            description: format!("Subscription for {} month(s)", req.months),
            complete_payment_url: self.return_url.clone(),
            cancel_checkout_url: self.return_url.clone(),
            merchant_reference_id: format!("purchase_{}", req.purchase_id),
            payment_method_type_categories: CHECKOUT_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        };
        let json = serde_json::to_string(&body)
            .map_err(|e| ProviderError::Config(format!("rapyd checkout encode failed: {e}")))?;

        let data: CheckoutData = self
            .send_signed(Method::POST, "/v1/checkout", Some(json))
            .await?;

        tracing::info!(
            purchase_id = %mask_half(req.purchase_id),
            checkout_id = %data.id,
            country = %chosen.country,
            currency = %chosen.currency,
            amount = chosen.amount,
            "rapyd checkout created"
        );

        Ok(ProviderCheckout {
            external_id: data.id,
            status: data.status,
            redirect_url: data.redirect_url,
            amount: chosen.amount,
            currency: chosen.currency,
            country: Some(chosen.country),
        })
    }
}
