//! Store contracts used by the payment core.
//!
//! Every mutator that moves a purchase or referral through its lifecycle is a
//! single conditional write and reports whether a row changed. `false` means
//! the precondition no longer held (someone else got there first); callers
//! treat it as a lost race, not a failure.
//!
//! Activations and referral bonuses are guarded by a lease: a timestamp taken
//! by one conditional write before the entitlement call and cleared when the
//! terminal flag is committed or the attempt fails. A lease older than
//! `stale_before` belongs to an attempt that died and can be taken over.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_schemas::{Correlation, Customer, InvoiceType, NewPurchase, Purchase, Referral};

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Insert in `New` with no correlation. Returns the new id.
    async fn insert_purchase(&self, new: &NewPurchase) -> anyhow::Result<i64>;

    async fn find_purchase(&self, id: i64) -> anyhow::Result<Option<Purchase>>;

    /// Write the correlation columns of `invoice_type` and move `New -> Pending`.
    async fn set_correlation_pending(
        &self,
        id: i64,
        invoice_type: InvoiceType,
        correlation: &Correlation,
    ) -> anyhow::Result<bool>;

    /// Take the activation lease of a `New|Pending` purchase when none is
    /// held or the held one was taken before `stale_before`.
    async fn claim_activation(
        &self,
        id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Drop the activation lease of a purchase that is still `New|Pending`.
    async fn release_activation(&self, id: i64) -> anyhow::Result<bool>;

    /// `New|Pending -> Paid`, stamping `paid_at` and clearing the lease.
    async fn mark_paid(&self, id: i64) -> anyhow::Result<bool>;

    /// `New|Pending -> Cancel`; refused while an activation lease is held.
    async fn cancel_purchase(&self, id: i64) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_customer(&self, id: i64) -> anyhow::Result<Option<Customer>>;

    async fn find_customer_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> anyhow::Result<Option<Customer>>;

    async fn update_entitlement(
        &self,
        customer_id: i64,
        subscription_link: &str,
        expire_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn find_referral_by_referee(&self, referee_id: i64) -> anyhow::Result<Option<Referral>>;

    /// Take the bonus lease of an ungranted referral when none is held or the
    /// held one was taken before `stale_before`.
    async fn claim_bonus(
        &self,
        referral_id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Drop the bonus lease of an ungranted referral.
    async fn release_bonus(&self, referral_id: i64) -> anyhow::Result<bool>;

    /// Flip `bonus_granted` false -> true, clearing the lease.
    async fn mark_bonus_granted(&self, referral_id: i64) -> anyhow::Result<bool>;
}
