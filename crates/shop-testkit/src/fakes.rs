//! Scripted stand-ins for the outbound integrations. Each one counts calls
//! so scenarios can assert on side effects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_providers::remnawave::extended_expiry;
use shop_providers::{
    CheckoutClient, CheckoutStatus, CheckoutStatusSource, EntitlementProvider, InvoiceRequest,
    Notifier, PaymentLookup, ProviderError, RemotePayment,
};
use shop_schemas::{Entitlement, InvoiceType, Keyboard, ProviderCheckout};

fn unavailable(what: &str) -> ProviderError {
    ProviderError::Api {
        status: 503,
        message: format!("{what} unavailable"),
    }
}

// ----- Checkout -----

pub struct FakeCheckout {
    invoice_type: InvoiceType,
    fail: AtomicBool,
    calls: Mutex<Vec<InvoiceRequest>>,
}

impl FakeCheckout {
    pub fn new(invoice_type: InvoiceType) -> Self {
        Self {
            invoice_type,
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<InvoiceRequest> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn external_id_for(&self, purchase_id: i64) -> String {
        format!("{}-{purchase_id}", self.invoice_type)
    }
}

#[async_trait]
impl CheckoutClient for FakeCheckout {
    fn invoice_type(&self) -> InvoiceType {
        self.invoice_type
    }

    async fn create_invoice(&self, req: &InvoiceRequest) -> Result<ProviderCheckout, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(req.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("checkout"));
        }
        Ok(ProviderCheckout {
            external_id: self.external_id_for(req.purchase_id),
            status: "pending".to_string(),
            redirect_url: format!("https://pay.example/{}/{}", self.invoice_type, req.purchase_id),
            amount: req.amount,
            currency: req.currency.clone(),
            country: None,
        })
    }
}

// ----- Entitlements -----

/// Panel fake that extends from the later of now and the current expiry.
#[derive(Default)]
pub struct FakeEntitlements {
    fail: AtomicBool,
    fail_next: AtomicUsize,
    fail_for: Mutex<HashMap<i64, usize>>,
    expiries: Mutex<HashMap<i64, DateTime<Utc>>>,
    calls: Mutex<Vec<(i64, u64, i64)>>,
}

impl FakeEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` calls with a 503, then recover.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls for `telegram_id` only.
    pub fn fail_for(&self, telegram_id: i64, n: usize) {
        self.fail_for
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(telegram_id, n);
    }

    /// `(telegram_id, traffic_limit_bytes, days)` per call.
    pub fn calls(&self) -> Vec<(i64, u64, i64)> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[async_trait]
impl EntitlementProvider for FakeEntitlements {
    async fn create_or_update_user(
        &self,
        _customer_id: i64,
        telegram_id: i64,
        traffic_limit_bytes: u64,
        days: i64,
    ) -> Result<Entitlement, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((telegram_id, traffic_limit_bytes, days));
        let transient = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let targeted = {
            let mut fail_for = self.fail_for.lock().unwrap_or_else(|p| p.into_inner());
            match fail_for.get_mut(&telegram_id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };
        if transient || targeted || self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("panel"));
        }
        let mut expiries = self.expiries.lock().unwrap_or_else(|p| p.into_inner());
        let expire_at = extended_expiry(Utc::now(), expiries.get(&telegram_id).copied(), days);
        expiries.insert(telegram_id, expire_at);
        Ok(Entitlement {
            subscription_url: format!("https://sub.example/{telegram_id}"),
            expire_at,
        })
    }
}

// ----- Notifications -----

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    fail: AtomicBool,
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<(i64, i64)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// `(chat_id, message_id)` per delete.
    pub fn deleted(&self) -> Vec<(i64, i64)> {
        self.deleted.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("bot api"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(SentMessage {
                chat_id,
                text: text.to_string(),
                keyboard: keyboard.cloned(),
            });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("bot api"));
        }
        self.deleted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((chat_id, message_id));
        Ok(())
    }
}

// ----- Checkout status -----

/// Rapyd status fake. Unknown checkout ids are reported as `NEW`.
#[derive(Default)]
pub struct FakeStatusSource {
    statuses: Mutex<HashMap<String, CheckoutStatus>>,
    calls: AtomicUsize,
}

impl FakeStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, checkout_id: &str, status: &str, payment_status: Option<&str>) {
        self.statuses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(
                checkout_id.to_string(),
                CheckoutStatus {
                    checkout_id: checkout_id.to_string(),
                    status: status.to_string(),
                    payment_status: payment_status.map(str::to_string),
                },
            );
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckoutStatusSource for FakeStatusSource {
    async fn checkout_status(&self, checkout_id: &str) -> Result<CheckoutStatus, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let statuses = self.statuses.lock().unwrap_or_else(|p| p.into_inner());
        Ok(statuses.get(checkout_id).cloned().unwrap_or(CheckoutStatus {
            checkout_id: checkout_id.to_string(),
            status: "NEW".to_string(),
            payment_status: None,
        }))
    }
}

// ----- Payment look-up -----

/// YooKassa look-up fake. Unknown payment ids are a 404.
pub struct FakePaymentLookup {
    invoice_type: InvoiceType,
    payments: Mutex<HashMap<String, RemotePayment>>,
    calls: AtomicUsize,
}

impl FakePaymentLookup {
    pub fn new(invoice_type: InvoiceType) -> Self {
        Self {
            invoice_type,
            payments: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_payment(&self, payment: RemotePayment) {
        self.payments
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(payment.payment_id.clone(), payment);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentLookup for FakePaymentLookup {
    fn invoice_type(&self) -> InvoiceType {
        self.invoice_type
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<RemotePayment, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payments
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(payment_id)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: format!("payment {payment_id} not found"),
            })
    }
}
