//! In-memory stores with the same conditional-write contract as `PgStore`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_db::{CustomerStore, PurchaseStore, ReferralStore};
use shop_schemas::{
    Correlation, Customer, InvoiceType, NewPurchase, Purchase, PurchaseStatus, Referral,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    purchases: BTreeMap<i64, Purchase>,
    customers: BTreeMap<i64, Customer>,
    referrals: BTreeMap<i64, Referral>,
    activation_leases: BTreeMap<i64, DateTime<Utc>>,
    bonus_leases: BTreeMap<i64, DateTime<Utc>>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// One store implementing all three store traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Artificial latency before `cancel_purchase`.
    cancel_delay: Mutex<Option<Duration>>,
    fail_writes: Mutex<bool>,
    fail_entitlement_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_writes(&self) -> Result<()> {
        if *self.fail_writes.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(anyhow!("memory store: writes disabled"));
        }
        Ok(())
    }

    pub fn add_customer(&self, telegram_id: i64, language: &str) -> Customer {
        let mut inner = self.lock();
        let id = inner.next_id();
        let customer = Customer {
            id,
            telegram_id,
            language: language.to_string(),
            subscription_link: None,
            expire_at: None,
        };
        inner.customers.insert(id, customer.clone());
        customer
    }

    pub fn add_referral(&self, referrer_telegram_id: i64, referee_telegram_id: i64) -> i64 {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.referrals.insert(
            id,
            Referral {
                id,
                referrer_id: referrer_telegram_id,
                referee_id: referee_telegram_id,
                bonus_granted: false,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Insert a purchase row as-is (status and correlation included).
    pub fn seed_purchase(&self, mut purchase: Purchase) -> i64 {
        let mut inner = self.lock();
        let id = inner.next_id();
        purchase.id = id;
        inner.purchases.insert(id, purchase);
        id
    }

    pub fn purchase(&self, id: i64) -> Option<Purchase> {
        self.lock().purchases.get(&id).cloned()
    }

    pub fn purchases(&self) -> Vec<Purchase> {
        self.lock().purchases.values().cloned().collect()
    }

    pub fn customer(&self, id: i64) -> Option<Customer> {
        self.lock().customers.get(&id).cloned()
    }

    pub fn referral(&self, id: i64) -> Option<Referral> {
        self.lock().referrals.get(&id).cloned()
    }

    /// When the activation lease of `id` was taken, if one is held.
    pub fn activation_lease(&self, id: i64) -> Option<DateTime<Utc>> {
        self.lock().activation_leases.get(&id).copied()
    }

    pub fn bonus_lease(&self, referral_id: i64) -> Option<DateTime<Utc>> {
        self.lock().bonus_leases.get(&referral_id).copied()
    }

    /// Plant a lease as if an earlier attempt had taken it at `at` and died.
    pub fn seed_activation_lease(&self, id: i64, at: DateTime<Utc>) {
        self.lock().activation_leases.insert(id, at);
    }

    pub fn set_cancel_delay(&self, delay: Duration) {
        *self.cancel_delay.lock().unwrap_or_else(|p| p.into_inner()) = Some(delay);
    }

    /// Make only `update_entitlement` fail.
    pub fn set_fail_entitlement_writes(&self, fail: bool) {
        *self
            .fail_entitlement_writes
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = fail;
    }

    /// Make every subsequent mutator fail.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }
}

#[async_trait]
impl PurchaseStore for MemoryStore {
    async fn insert_purchase(&self, new: &NewPurchase) -> Result<i64> {
        let mut inner = self.lock();
        if !inner.customers.contains_key(&new.customer_id) {
            return Err(anyhow!("insert_purchase: unknown customer {}", new.customer_id));
        }
        if new.months <= 0 {
            return Err(anyhow!("insert_purchase: months must be positive"));
        }
        let id = inner.next_id();
        inner.purchases.insert(
            id,
            Purchase {
                id,
                customer_id: new.customer_id,
                invoice_type: new.invoice_type,
                status: PurchaseStatus::New,
                amount: new.amount,
                currency: new.currency.clone(),
                months: new.months,
                correlation: None,
                created_at: Utc::now(),
                paid_at: None,
            },
        );
        Ok(id)
    }

    async fn find_purchase(&self, id: i64) -> Result<Option<Purchase>> {
        Ok(self.purchase(id))
    }

    async fn set_correlation_pending(
        &self,
        id: i64,
        invoice_type: InvoiceType,
        correlation: &Correlation,
    ) -> Result<bool> {
        self.check_writes()?;
        let mut inner = self.lock();
        let Some(p) = inner.purchases.get_mut(&id) else {
            return Ok(false);
        };
        if p.status != PurchaseStatus::New {
            return Ok(false);
        }
        if p.invoice_type != invoice_type {
            return Err(anyhow!(
                "set_correlation_pending: purchase is {}, not {}",
                p.invoice_type,
                invoice_type
            ));
        }
        p.correlation = Some(correlation.clone());
        p.status = PurchaseStatus::Pending;
        Ok(true)
    }

    async fn claim_activation(
        &self,
        id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_writes()?;
        let mut inner = self.lock();
        let open = inner
            .purchases
            .get(&id)
            .is_some_and(|p| p.status.can_transition_to(PurchaseStatus::Paid));
        if !open {
            return Ok(false);
        }
        if let Some(held) = inner.activation_leases.get(&id) {
            if *held >= stale_before {
                return Ok(false);
            }
        }
        inner.activation_leases.insert(id, now);
        Ok(true)
    }

    async fn release_activation(&self, id: i64) -> Result<bool> {
        self.check_writes()?;
        let mut inner = self.lock();
        let open = inner
            .purchases
            .get(&id)
            .is_some_and(|p| p.status.can_transition_to(PurchaseStatus::Paid));
        Ok(open && inner.activation_leases.remove(&id).is_some())
    }

    async fn mark_paid(&self, id: i64) -> Result<bool> {
        self.check_writes()?;
        let mut inner = self.lock();
        let Some(p) = inner.purchases.get_mut(&id) else {
            return Ok(false);
        };
        if !p.status.can_transition_to(PurchaseStatus::Paid) {
            return Ok(false);
        }
        p.status = PurchaseStatus::Paid;
        p.paid_at = Some(Utc::now());
        inner.activation_leases.remove(&id);
        Ok(true)
    }

    async fn cancel_purchase(&self, id: i64) -> Result<bool> {
        let delay = *self.cancel_delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.check_writes()?;
        let mut inner = self.lock();
        if inner.activation_leases.contains_key(&id) {
            return Ok(false);
        }
        let Some(p) = inner.purchases.get_mut(&id) else {
            return Ok(false);
        };
        if !p.status.can_transition_to(PurchaseStatus::Cancel) {
            return Ok(false);
        }
        p.status = PurchaseStatus::Cancel;
        Ok(true)
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn find_customer(&self, id: i64) -> Result<Option<Customer>> {
        Ok(self.customer(id))
    }

    async fn find_customer_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>> {
        Ok(self
            .lock()
            .customers
            .values()
            .find(|c| c.telegram_id == telegram_id)
            .cloned())
    }

    async fn update_entitlement(
        &self,
        customer_id: i64,
        subscription_link: &str,
        expire_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_writes()?;
        if *self
            .fail_entitlement_writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
        {
            return Err(anyhow!("memory store: entitlement writes disabled"));
        }
        let mut inner = self.lock();
        let c = inner
            .customers
            .get_mut(&customer_id)
            .ok_or_else(|| anyhow!("update_entitlement: unknown customer {customer_id}"))?;
        c.subscription_link = Some(subscription_link.to_string());
        c.expire_at = Some(expire_at);
        Ok(())
    }
}

#[async_trait]
impl ReferralStore for MemoryStore {
    async fn find_referral_by_referee(&self, referee_id: i64) -> Result<Option<Referral>> {
        Ok(self
            .lock()
            .referrals
            .values()
            .find(|r| r.referee_id == referee_id)
            .cloned())
    }

    async fn claim_bonus(
        &self,
        referral_id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_writes()?;
        let mut inner = self.lock();
        let ungranted = inner
            .referrals
            .get(&referral_id)
            .is_some_and(|r| !r.bonus_granted);
        if !ungranted {
            return Ok(false);
        }
        if let Some(held) = inner.bonus_leases.get(&referral_id) {
            if *held >= stale_before {
                return Ok(false);
            }
        }
        inner.bonus_leases.insert(referral_id, now);
        Ok(true)
    }

    async fn release_bonus(&self, referral_id: i64) -> Result<bool> {
        self.check_writes()?;
        let mut inner = self.lock();
        let ungranted = inner
            .referrals
            .get(&referral_id)
            .is_some_and(|r| !r.bonus_granted);
        Ok(ungranted && inner.bonus_leases.remove(&referral_id).is_some())
    }

    async fn mark_bonus_granted(&self, referral_id: i64) -> Result<bool> {
        self.check_writes()?;
        let mut inner = self.lock();
        match inner.referrals.get_mut(&referral_id) {
            Some(r) if !r.bonus_granted => {
                r.bonus_granted = true;
                inner.bonus_leases.remove(&referral_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
