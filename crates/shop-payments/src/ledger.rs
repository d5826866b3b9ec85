//! Purchase ledger: the only place purchase status changes.
//!
//! ```text
//! New --checkout created--> Pending --confirmed--> Paid
//! New|Pending --cancel--> Cancel
//! ```
//!
//! Each transition is one conditional store write. A write that changes no
//! row is re-read so the caller learns why it lost.
//!
//! Activation runs under a lease: `claim_activation` before the entitlement
//! call, `commit_paid` after it is persisted, `release_activation` when it
//! fails. A purchase under lease cannot be cancelled.

use std::sync::Arc;

use chrono::{Duration, Utc};
use shop_db::PurchaseStore;
use shop_schemas::{InvoiceType, NewPurchase, ProviderCheckout, Purchase, PurchaseStatus};

use crate::PaymentError;

/// Result of trying to take the activation lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationClaim {
    /// This caller holds the lease and may provision.
    Claimed,
    /// Someone already activated the purchase.
    AlreadyPaid,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn PurchaseStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn PurchaseStore>) -> Self {
        Self { store }
    }

    pub async fn open(&self, new: &NewPurchase) -> Result<i64, PaymentError> {
        Ok(self.store.insert_purchase(new).await?)
    }

    pub async fn load(&self, id: i64) -> Result<Purchase, PaymentError> {
        self.store
            .find_purchase(id)
            .await?
            .ok_or_else(|| PaymentError::purchase_not_found(id))
    }

    /// Persist the provider correlation and move `New -> Pending`.
    pub async fn attach_checkout(
        &self,
        id: i64,
        invoice_type: InvoiceType,
        checkout: &ProviderCheckout,
    ) -> Result<(), PaymentError> {
        if self
            .store
            .set_correlation_pending(id, invoice_type, &checkout.correlation())
            .await?
        {
            return Ok(());
        }
        Err(self.rejected(id, PurchaseStatus::Pending).await)
    }

    /// Take the activation lease. A lease older than `lease` is taken over.
    pub async fn claim_activation(
        &self,
        id: i64,
        lease: Duration,
    ) -> Result<ActivationClaim, PaymentError> {
        let now = Utc::now();
        if self.store.claim_activation(id, now, now - lease).await? {
            return Ok(ActivationClaim::Claimed);
        }
        let current = self.load(id).await?;
        match current.status {
            PurchaseStatus::Paid => Ok(ActivationClaim::AlreadyPaid),
            PurchaseStatus::New | PurchaseStatus::Pending => {
                Err(PaymentError::ActivationInProgress(id))
            }
            from => Err(PaymentError::InvalidTransition {
                purchase_id: id,
                from,
                to: PurchaseStatus::Paid,
            }),
        }
    }

    /// Give the lease back after a failed attempt so a retry can run now.
    pub async fn release_activation(&self, id: i64) -> Result<(), PaymentError> {
        self.store.release_activation(id).await?;
        Ok(())
    }

    /// `New|Pending -> Paid` under the lease. `false` when the purchase was
    /// already Paid.
    pub async fn commit_paid(&self, id: i64) -> Result<bool, PaymentError> {
        if self.store.mark_paid(id).await? {
            return Ok(true);
        }
        let current = self.load(id).await?;
        match current.status {
            PurchaseStatus::Paid => Ok(false),
            from => Err(PaymentError::InvalidTransition {
                purchase_id: id,
                from,
                to: PurchaseStatus::Paid,
            }),
        }
    }

    /// `New|Pending -> Cancel`.
    pub async fn cancel(&self, id: i64) -> Result<(), PaymentError> {
        let current = self.load(id).await?;
        if !current.status.can_transition_to(PurchaseStatus::Cancel) {
            return Err(PaymentError::InvalidTransition {
                purchase_id: id,
                from: current.status,
                to: PurchaseStatus::Cancel,
            });
        }
        if self.store.cancel_purchase(id).await? {
            return Ok(());
        }
        let current = self.load(id).await?;
        if current.status.can_transition_to(PurchaseStatus::Cancel) {
            // Still open, so the write lost to an activation lease.
            return Err(PaymentError::ActivationInProgress(id));
        }
        Err(PaymentError::InvalidTransition {
            purchase_id: id,
            from: current.status,
            to: PurchaseStatus::Cancel,
        })
    }

    async fn rejected(&self, id: i64, to: PurchaseStatus) -> PaymentError {
        match self.load(id).await {
            Ok(p) => PaymentError::InvalidTransition {
                purchase_id: id,
                from: p.status,
                to,
            },
            Err(e) => e,
        }
    }
}
