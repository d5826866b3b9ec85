//! Rapyd wire types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RapydStatus {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub operation_id: String,
}

/// Every Rapyd response: `{ "status": {...}, "data": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: RapydStatus,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodRef {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckoutRequest {
    pub amount: i64,
    pub currency: String,
    pub country: String,
    pub payment_method: PaymentMethodRef,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_checkout_url: Option<String>,
    pub merchant_reference_id: String,
    pub payment_method_type_categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutData {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub payment: Option<PaymentData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub status: i64,
}

impl PaymentMethodDetails {
    /// An active card method.
    pub fn is_active_card(&self) -> bool {
        self.category == "card" && self.status == 1
    }
}
