use shop_providers::ProviderError;
use shop_schemas::{mask_half, InvoiceType, PurchaseStatus};
use thiserror::Error;

/// Failures of the payment core. Ids are masked in messages.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{entity} {} not found", mask_half(*.id))]
    NotFound { entity: &'static str, id: i64 },

    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("persistence failed: {0:#}")]
    Persistence(#[from] anyhow::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("purchase {} cannot move from {from} to {to}", mask_half(*.purchase_id))]
    InvalidTransition {
        purchase_id: i64,
        from: PurchaseStatus,
        to: PurchaseStatus,
    },

    #[error("purchase {} is {actual}, expected {expected}", mask_half(*.purchase_id))]
    InvoiceTypeMismatch {
        purchase_id: i64,
        expected: InvoiceType,
        actual: InvoiceType,
    },

    #[error("purchase {} has no provider correlation id", mask_half(*.0))]
    MissingCorrelation(i64),

    #[error("purchase {} is being activated", mask_half(*.0))]
    ActivationInProgress(i64),

    #[error("payment for purchase {} does not match: {reason}", mask_half(*.purchase_id))]
    PaymentMismatch { purchase_id: i64, reason: String },

    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl PaymentError {
    pub fn purchase_not_found(id: i64) -> Self {
        PaymentError::NotFound {
            entity: "purchase",
            id,
        }
    }

    pub fn customer_not_found(id: i64) -> Self {
        PaymentError::NotFound {
            entity: "customer",
            id,
        }
    }
}
