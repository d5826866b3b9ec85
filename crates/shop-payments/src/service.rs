use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shop_config::{select_texts, ShopConfig, Texts};
use shop_db::{CustomerStore, ReferralStore};
use shop_providers::{CheckoutStatusSource, EntitlementProvider, Notifier, PaymentLookup};
use shop_schemas::{mask_half, Customer, InvoiceType, Purchase};

use crate::factory::{InvoiceFactory, PurchaseRequest};
use crate::ledger::Ledger;
use crate::prompt_cache::PromptCache;
use crate::PaymentError;

// ---------------------------------------------------------------------------
// Settings / deps
// ---------------------------------------------------------------------------

/// Tunables of the payment core, usually derived from [`ShopConfig`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub traffic_limit_bytes: u64,
    pub referral_days: i64,
    pub trial_days: i64,
    pub trial_traffic_limit_bytes: u64,
    pub mini_app_url: Option<String>,
    pub cancel_timeout: Duration,
    /// How long an activation or referral-bonus lease is honoured before a
    /// later attempt may take it over.
    pub activation_lease: Duration,
    pub default_language: String,
    pub texts: BTreeMap<String, Texts>,
}

impl ServiceSettings {
    pub fn from_config(cfg: &ShopConfig) -> Self {
        Self {
            traffic_limit_bytes: cfg.subscription.traffic_limit_bytes(),
            referral_days: cfg.subscription.referral_days,
            trial_days: cfg.subscription.trial_days,
            trial_traffic_limit_bytes: cfg.subscription.trial_traffic_limit_bytes(),
            mini_app_url: cfg.bot.mini_app_url.clone(),
            cancel_timeout: Duration::from_secs(cfg.http.cancel_timeout_secs),
            activation_lease: Duration::from_secs(cfg.subscription.activation_lease_secs),
            default_language: cfg.default_language.clone(),
            texts: cfg.texts.clone(),
        }
    }

    pub fn texts_for(&self, language: &str) -> Texts {
        select_texts(&self.texts, &self.default_language, language)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&ShopConfig::default())
    }
}

/// Every boundary the payment core talks to.
#[derive(Clone)]
pub struct ServiceDeps {
    pub ledger: Ledger,
    pub customers: Arc<dyn CustomerStore>,
    pub referrals: Arc<dyn ReferralStore>,
    pub factory: InvoiceFactory,
    /// Pollable provider (Rapyd); `None` when polling is not configured.
    pub status_source: Option<Arc<dyn CheckoutStatusSource>>,
    /// Providers whose payments are re-fetched to confirm a callback.
    pub payment_lookups: BTreeMap<InvoiceType, Arc<dyn PaymentLookup>>,
    pub entitlements: Arc<dyn EntitlementProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub prompts: Arc<dyn PromptCache>,
}

// ---------------------------------------------------------------------------
// PaymentService
// ---------------------------------------------------------------------------

/// Payment lifecycle orchestration: opening purchases, confirming them,
/// activating entitlements and crediting referrals.
#[derive(Clone)]
pub struct PaymentService {
    pub(crate) deps: ServiceDeps,
    pub(crate) settings: ServiceSettings,
}

impl PaymentService {
    pub fn new(deps: ServiceDeps, settings: ServiceSettings) -> Self {
        Self { deps, settings }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Ledger {
        &self.deps.ledger
    }

    pub fn enabled_invoice_types(&self) -> Vec<InvoiceType> {
        self.deps.factory.enabled()
    }

    pub async fn find_purchase(&self, purchase_id: i64) -> Result<Purchase, PaymentError> {
        self.deps.ledger.load(purchase_id).await
    }

    pub(crate) fn lease(&self) -> Result<chrono::Duration, PaymentError> {
        chrono::Duration::from_std(self.settings.activation_lease)
            .map_err(|e| PaymentError::Configuration(format!("activation lease: {e}")))
    }

    pub(crate) async fn load_customer(&self, customer_id: i64) -> Result<Customer, PaymentError> {
        self.deps
            .customers
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| PaymentError::customer_not_found(customer_id))
    }

    /// Open a purchase for `customer` through the adapter of the requested
    /// invoice type. Returns `(redirect_url, purchase_id)`.
    pub async fn create_purchase(
        &self,
        customer: &Customer,
        req: &PurchaseRequest,
    ) -> Result<(String, i64), PaymentError> {
        let texts = self.settings.texts_for(&customer.language);
        self.deps
            .factory
            .create(&self.deps.ledger, customer, req, &texts)
            .await
    }

    /// Record the "awaiting payment" message shown for `purchase_id`.
    pub fn remember_prompt(&self, purchase_id: i64, message_id: i64) {
        self.deps.prompts.remember(purchase_id, message_id);
    }

    /// Cancel a purchase that is still `New` or `Pending`.
    pub async fn cancel_purchase(&self, purchase_id: i64) -> Result<(), PaymentError> {
        let budget = self.settings.cancel_timeout;
        match tokio::time::timeout(budget, self.deps.ledger.cancel(purchase_id)).await {
            Ok(res) => {
                if res.is_ok() {
                    tracing::info!(purchase_id = %mask_half(purchase_id), "purchase cancelled");
                }
                res
            }
            Err(_) => {
                tracing::warn!(purchase_id = %mask_half(purchase_id), ?budget, "cancel timed out");
                Err(PaymentError::Timeout("cancel purchase"))
            }
        }
    }

    /// Grant the trial entitlement. `Ok(None)` when trials are disabled.
    pub async fn activate_trial(&self, telegram_id: i64) -> Result<Option<String>, PaymentError> {
        if self.settings.trial_days == 0 {
            return Ok(None);
        }

        let customer = self
            .deps
            .customers
            .find_customer_by_telegram_id(telegram_id)
            .await?
            .ok_or(PaymentError::NotFound {
                entity: "customer",
                id: telegram_id,
            })?;

        let ent = self
            .deps
            .entitlements
            .create_or_update_user(
                customer.id,
                telegram_id,
                self.settings.trial_traffic_limit_bytes,
                self.settings.trial_days,
            )
            .await?;

        self.deps
            .customers
            .update_entitlement(customer.id, &ent.subscription_url, ent.expire_at)
            .await?;

        tracing::info!(customer_id = %mask_half(customer.id), days = self.settings.trial_days, "trial activated");
        Ok(Some(ent.subscription_url))
    }
}
