//! Invoice factory: routes a purchase request to the adapter of its invoice
//! type and records the result on the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use shop_config::Texts;
use shop_providers::{CheckoutClient, InvoiceRequest};
use shop_schemas::{mask_half, Customer, InvoiceType, NewPurchase};

use crate::ledger::Ledger;
use crate::PaymentError;

/// What the bot layer asks for when a customer picks a plan.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    /// Whole units of the invoice type's ledger currency.
    pub amount: i64,
    pub months: i32,
    pub invoice_type: InvoiceType,
    /// Chat username, embedded in provider payloads.
    pub username: String,
}

/// Parse an invoice type at an outer boundary (HTTP, CLI).
pub fn parse_invoice_type(raw: &str) -> Result<InvoiceType, PaymentError> {
    InvoiceType::parse(raw).map_err(|e| PaymentError::Configuration(e.to_string()))
}

#[derive(Clone, Default)]
pub struct InvoiceFactory {
    adapters: BTreeMap<InvoiceType, Arc<dyn CheckoutClient>>,
}

impl InvoiceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the invoice type it reports.
    pub fn register(&mut self, adapter: Arc<dyn CheckoutClient>) {
        self.adapters.insert(adapter.invoice_type(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn CheckoutClient>) -> Self {
        self.register(adapter);
        self
    }

    pub fn enabled(&self) -> Vec<InvoiceType> {
        self.adapters.keys().copied().collect()
    }

    pub fn adapter(&self, invoice_type: InvoiceType) -> Result<&Arc<dyn CheckoutClient>, PaymentError> {
        self.adapters.get(&invoice_type).ok_or_else(|| {
            PaymentError::Configuration(format!("no adapter configured for invoice type {invoice_type}"))
        })
    }

    /// Open a purchase and its remote checkout. Returns `(redirect_url, purchase_id)`.
    ///
    /// A failed remote call or correlation write leaves the row in `New`.
    pub async fn create(
        &self,
        ledger: &Ledger,
        customer: &Customer,
        req: &PurchaseRequest,
        texts: &Texts,
    ) -> Result<(String, i64), PaymentError> {
        let adapter = self.adapter(req.invoice_type)?;

        let currency = req.invoice_type.ledger_currency().to_string();
        let purchase_id = ledger
            .open(&NewPurchase {
                customer_id: customer.id,
                invoice_type: req.invoice_type,
                amount: req.amount,
                currency: currency.clone(),
                months: req.months,
            })
            .await?;

        let invoice = InvoiceRequest {
            purchase_id,
            customer_id: customer.id,
            amount: req.amount,
            currency,
            months: req.months,
            title: texts.invoice_title.clone(),
            label: texts.invoice_label.clone(),
            description: texts.invoice_description.clone(),
            username: req.username.clone(),
        };

        let checkout = match adapter.create_invoice(&invoice).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(
                    purchase_id = %mask_half(purchase_id),
                    invoice_type = %req.invoice_type,
                    error = %e,
                    "checkout creation failed, purchase left in new"
                );
                return Err(e.into());
            }
        };

        if let Err(e) = ledger
            .attach_checkout(purchase_id, req.invoice_type, &checkout)
            .await
        {
            tracing::error!(
                purchase_id = %mask_half(purchase_id),
                invoice_type = %req.invoice_type,
                external_id = %checkout.external_id,
                error = %e,
                "correlation write failed, purchase left in new"
            );
            return Err(e);
        }

        tracing::info!(
            purchase_id = %mask_half(purchase_id),
            customer_id = %mask_half(customer.id),
            invoice_type = %req.invoice_type,
            ledger_amount = req.amount,
            charged_amount = checkout.amount,
            charged_currency = %checkout.currency,
            "purchase opened"
        );

        Ok((checkout.redirect_url, purchase_id))
    }
}
