//! Confirmation reconciler: callback signals, YooKassa payment look-ups and
//! Rapyd status polling.

use shop_providers::ProviderError;
use shop_schemas::{mask_half, InvoiceType, Purchase, PurchaseStatus};

use crate::activation::{Activation, ActivationOutcome};
use crate::service::PaymentService;
use crate::PaymentError;

/// What the provider says was charged, in the ledger currency of the
/// invoice type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidAmount {
    pub amount: i64,
    pub currency: String,
}

/// A provider callback reporting that `purchase_id` was paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidSignal {
    pub purchase_id: i64,
    pub invoice_type: InvoiceType,
    /// Checked against the ledger row when present.
    pub paid: Option<PaidAmount>,
}

impl PaidSignal {
    pub fn new(purchase_id: i64, invoice_type: InvoiceType) -> Self {
        Self {
            purchase_id,
            invoice_type,
            paid: None,
        }
    }

    pub fn with_amount(mut self, amount: i64, currency: impl Into<String>) -> Self {
        self.paid = Some(PaidAmount {
            amount,
            currency: currency.into(),
        });
        self
    }
}

fn check_amount(purchase: &Purchase, paid: &PaidAmount) -> Result<(), PaymentError> {
    if paid.amount == purchase.amount && paid.currency == purchase.currency {
        return Ok(());
    }
    Err(PaymentError::PaymentMismatch {
        purchase_id: purchase.id,
        reason: format!(
            "paid {} {}, expected {} {}",
            paid.amount, paid.currency, purchase.amount, purchase.currency
        ),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    AlreadyPaid,
    Activated(Activation),
    /// The checkout is still open remotely. Not an error.
    NotYetPaid,
}

impl From<ActivationOutcome> for PollOutcome {
    fn from(o: ActivationOutcome) -> Self {
        match o {
            ActivationOutcome::AlreadyPaid => PollOutcome::AlreadyPaid,
            ActivationOutcome::Activated(a) => PollOutcome::Activated(a),
        }
    }
}

impl PaymentService {
    pub async fn handle_paid_signal(
        &self,
        signal: PaidSignal,
    ) -> Result<ActivationOutcome, PaymentError> {
        let purchase = self.deps.ledger.load(signal.purchase_id).await?;
        if purchase.invoice_type != signal.invoice_type {
            return Err(PaymentError::InvoiceTypeMismatch {
                purchase_id: purchase.id,
                expected: purchase.invoice_type,
                actual: signal.invoice_type,
            });
        }
        if let Some(paid) = &signal.paid {
            if let Err(e) = check_amount(&purchase, paid) {
                tracing::warn!(purchase_id = %mask_half(purchase.id), error = %e, "paid signal rejected");
                return Err(e);
            }
        }
        if purchase.status == PurchaseStatus::Paid {
            tracing::debug!(purchase_id = %mask_half(purchase.id), "duplicate paid signal");
            return Ok(ActivationOutcome::AlreadyPaid);
        }
        self.activate(purchase.id).await
    }

    /// Re-fetch `payment_id` from the provider of `invoice_type` and activate
    /// the purchase it belongs to once the provider reports it succeeded.
    ///
    /// Callback bodies are never trusted on their own: the provider's record
    /// must name our purchase, carry the correlation id we stored and the
    /// amount we charged.
    pub async fn confirm_remote_payment(
        &self,
        invoice_type: InvoiceType,
        payment_id: &str,
    ) -> Result<PollOutcome, PaymentError> {
        let lookup = self.deps.payment_lookups.get(&invoice_type).ok_or_else(|| {
            PaymentError::Configuration(format!("{invoice_type} payment look-up is not configured"))
        })?;

        let remote = lookup.fetch_payment(payment_id).await?;
        if !remote.succeeded {
            tracing::debug!(%invoice_type, "remote payment not succeeded yet");
            return Ok(PollOutcome::NotYetPaid);
        }
        let purchase_id = remote.purchase_id.ok_or_else(|| {
            ProviderError::Decode(format!("{invoice_type} payment carries no purchase id"))
        })?;

        let purchase = self.deps.ledger.load(purchase_id).await?;
        if purchase.external_id() != Some(payment_id) {
            tracing::warn!(purchase_id = %mask_half(purchase_id), %invoice_type, "payment id does not match purchase");
            return Err(PaymentError::PaymentMismatch {
                purchase_id,
                reason: "payment id is not the one recorded for this purchase".to_string(),
            });
        }
        let amount = remote.amount.ok_or_else(|| PaymentError::PaymentMismatch {
            purchase_id,
            reason: "paid amount has a fractional part".to_string(),
        })?;

        let signal = PaidSignal::new(purchase_id, invoice_type).with_amount(amount, remote.currency);
        Ok(self.handle_paid_signal(signal).await?.into())
    }

    /// Ask Rapyd whether the checkout of `purchase_id` was paid and activate
    /// if so.
    pub async fn poll_checkout(&self, purchase_id: i64) -> Result<PollOutcome, PaymentError> {
        let purchase = self.deps.ledger.load(purchase_id).await?;
        if purchase.invoice_type != InvoiceType::Rapyd {
            return Err(PaymentError::InvoiceTypeMismatch {
                purchase_id,
                expected: InvoiceType::Rapyd,
                actual: purchase.invoice_type,
            });
        }
        if purchase.status == PurchaseStatus::Paid {
            return Ok(PollOutcome::AlreadyPaid);
        }
        let checkout_id = purchase
            .external_id()
            .ok_or(PaymentError::MissingCorrelation(purchase_id))?;

        let source = self.deps.status_source.as_ref().ok_or_else(|| {
            PaymentError::Configuration("rapyd status polling is not configured".to_string())
        })?;

        let status = source.checkout_status(checkout_id).await?;
        if !status.is_paid() {
            tracing::debug!(
                purchase_id = %mask_half(purchase_id),
                status = %status.status,
                "checkout not paid yet"
            );
            return Ok(PollOutcome::NotYetPaid);
        }

        Ok(self.activate(purchase_id).await?.into())
    }
}
