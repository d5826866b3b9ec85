use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shop_payments::{
    InvoiceFactory, Ledger, MemoryPromptCache, PaymentService, ServiceDeps, ServiceSettings,
};
use shop_providers::{CheckoutClient, CheckoutStatusSource, PaymentLookup, RemotePayment};
use shop_schemas::{Correlation, Customer, InvoiceType, Purchase, PurchaseStatus};

use crate::fakes::{
    FakeCheckout, FakeEntitlements, FakePaymentLookup, FakeStatusSource, RecordingNotifier,
};
use crate::memory::MemoryStore;

pub const GB: u64 = 1024 * 1024 * 1024;

/// Settings used by scenarios: 100 GB plans, 7 referral days, 3 trial days.
pub fn test_settings() -> ServiceSettings {
    ServiceSettings {
        traffic_limit_bytes: 100 * GB,
        referral_days: 7,
        trial_days: 3,
        trial_traffic_limit_bytes: 10 * GB,
        mini_app_url: None,
        cancel_timeout: Duration::from_secs(5),
        activation_lease: Duration::from_secs(300),
        default_language: "en".to_string(),
        texts: BTreeMap::new(),
    }
}

/// A `PaymentService` over in-memory fakes, keeping typed handles on every
/// fake for assertions.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub checkouts: BTreeMap<InvoiceType, Arc<FakeCheckout>>,
    pub entitlements: Arc<FakeEntitlements>,
    pub notifier: Arc<RecordingNotifier>,
    pub status: Arc<FakeStatusSource>,
    /// YooKassa payment records served to `confirm_remote_payment`.
    pub yookassa: Arc<FakePaymentLookup>,
    pub service: PaymentService,
}

impl Harness {
    /// Every invoice type enabled, polling wired.
    pub fn new() -> Self {
        Self::build(&InvoiceType::ALL, test_settings(), None)
    }

    pub fn with_settings(settings: ServiceSettings) -> Self {
        Self::build(&InvoiceType::ALL, settings, None)
    }

    pub fn with_types(enabled: &[InvoiceType]) -> Self {
        Self::build(enabled, test_settings(), None)
    }

    /// Fakes for every other type, `adapter` for its own.
    pub fn with_adapter(adapter: Arc<dyn CheckoutClient>) -> Self {
        let others: Vec<InvoiceType> = InvoiceType::ALL
            .into_iter()
            .filter(|t| *t != adapter.invoice_type())
            .collect();
        Self::build(&others, test_settings(), Some(adapter))
    }

    fn build(
        enabled: &[InvoiceType],
        settings: ServiceSettings,
        adapter: Option<Arc<dyn CheckoutClient>>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let entitlements = Arc::new(FakeEntitlements::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let status = Arc::new(FakeStatusSource::new());
        let yookassa = Arc::new(FakePaymentLookup::new(InvoiceType::Yookasa));
        let mut payment_lookups: BTreeMap<InvoiceType, Arc<dyn PaymentLookup>> = BTreeMap::new();
        payment_lookups.insert(InvoiceType::Yookasa, yookassa.clone());

        let mut checkouts = BTreeMap::new();
        let mut factory = InvoiceFactory::new();
        for t in enabled {
            let c = Arc::new(FakeCheckout::new(*t));
            factory.register(c.clone());
            checkouts.insert(*t, c);
        }
        if let Some(a) = adapter {
            factory.register(a);
        }

        let deps = ServiceDeps {
            ledger: Ledger::new(store.clone()),
            customers: store.clone(),
            referrals: store.clone(),
            factory,
            status_source: Some(status.clone() as Arc<dyn CheckoutStatusSource>),
            payment_lookups,
            entitlements: entitlements.clone(),
            notifier: notifier.clone(),
            prompts: Arc::new(MemoryPromptCache::new(Duration::from_secs(3600))),
        };

        Self {
            store,
            checkouts,
            entitlements,
            notifier,
            status,
            yookassa,
            service: PaymentService::new(deps, settings),
        }
    }

    pub fn checkout(&self, invoice_type: InvoiceType) -> &FakeCheckout {
        &self.checkouts[&invoice_type]
    }

    pub fn customer(&self, telegram_id: i64) -> Customer {
        self.store.add_customer(telegram_id, "en")
    }

    /// Seed a purchase directly in `status`, with a correlation unless the
    /// purchase is `New`.
    pub fn seed(&self, customer: &Customer, invoice_type: InvoiceType, status: PurchaseStatus) -> i64 {
        let correlation = (status != PurchaseStatus::New).then(|| Correlation {
            external_id: format!("{invoice_type}-seeded"),
            external_url: format!("https://pay.example/{invoice_type}/seeded"),
        });
        self.seed_with(customer, invoice_type, status, correlation)
    }

    pub fn seed_with(
        &self,
        customer: &Customer,
        invoice_type: InvoiceType,
        status: PurchaseStatus,
        correlation: Option<Correlation>,
    ) -> i64 {
        let now = chrono::Utc::now();
        self.store.seed_purchase(Purchase {
            id: 0,
            customer_id: customer.id,
            invoice_type,
            status,
            amount: 5,
            currency: invoice_type.ledger_currency().to_string(),
            months: 1,
            correlation,
            created_at: now,
            paid_at: (status == PurchaseStatus::Paid).then_some(now),
        })
    }
}

/// The provider's record of a succeeded payment for a purchase seeded by
/// [`Harness::seed`].
pub fn succeeded_payment(purchase: &Purchase) -> RemotePayment {
    RemotePayment {
        payment_id: purchase.external_id().unwrap_or_default().to_string(),
        succeeded: true,
        purchase_id: Some(purchase.id),
        amount: Some(purchase.amount),
        currency: purchase.currency.clone(),
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
