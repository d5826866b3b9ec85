//! Scenario: a purchase is activated at most once.
//!
//! # Invariant under test
//! An activation lease is taken before the entitlement call and `Paid` is
//! committed after it. A replayed or concurrent confirmation observes
//! `AlreadyPaid` (or `ActivationInProgress` while the lease is fresh) and
//! makes no entitlement call. A failed entitlement call releases the lease,
//! leaves the purchase open, and the next confirmation activates it once.
//!
//! All tests are in-process; no DB or network required.

use chrono::{Duration, Utc};
use shop_payments::{ActivationOutcome, PaidSignal, PaymentError};
use shop_schemas::{InvoiceType, PurchaseStatus};
use shop_testkit::{Harness, GB};

fn signal(purchase_id: i64, invoice_type: InvoiceType) -> PaidSignal {
    PaidSignal::new(purchase_id, invoice_type)
}

#[tokio::test]
async fn replayed_callback_does_not_extend_twice() {
    let h = Harness::new();
    let customer = h.customer(3001);
    let id = h.seed(&customer, InvoiceType::Crypto, PurchaseStatus::Pending);

    let first = h
        .service
        .handle_paid_signal(signal(id, InvoiceType::Crypto))
        .await
        .unwrap();
    let ActivationOutcome::Activated(a) = first else {
        panic!("expected activation, got {first:?}");
    };
    assert_eq!(a.subscription_url, "https://sub.example/3001");

    let second = h
        .service
        .handle_paid_signal(signal(id, InvoiceType::Crypto))
        .await
        .unwrap();
    assert_eq!(second, ActivationOutcome::AlreadyPaid);

    // Direct activation of a Paid purchase is also a no-op.
    assert_eq!(h.service.activate(id).await.unwrap(), ActivationOutcome::AlreadyPaid);

    assert_eq!(h.entitlements.calls(), vec![(3001, 100 * GB, 30)]);
    assert_eq!(h.notifier.sent().len(), 1);

    let p = h.store.purchase(id).unwrap();
    assert_eq!(p.status, PurchaseStatus::Paid);
    assert!(p.paid_at.is_some());

    let c = h.store.customer(customer.id).unwrap();
    assert_eq!(c.subscription_link.as_deref(), Some("https://sub.example/3001"));
    assert_eq!(c.expire_at, Some(a.expire_at));
}

#[tokio::test]
async fn concurrent_confirmations_activate_once() {
    let h = Harness::new();
    let customer = h.customer(3002);
    let id = h.seed(&customer, InvoiceType::Yookasa, PurchaseStatus::Pending);

    let (a, b) = tokio::join!(h.service.activate(id), h.service.activate(id));
    let outcomes = [a.unwrap(), b.unwrap()];

    let activated = outcomes
        .iter()
        .filter(|o| matches!(o, ActivationOutcome::Activated(_)))
        .count();
    assert_eq!(activated, 1, "{outcomes:?}");
    assert!(outcomes.contains(&ActivationOutcome::AlreadyPaid));
    assert_eq!(h.entitlements.call_count(), 1);
}

#[tokio::test]
async fn failed_entitlement_leaves_purchase_open_and_retry_activates_once() {
    let h = Harness::new();
    let customer = h.customer(3003);
    let id = h.seed(&customer, InvoiceType::Telegram, PurchaseStatus::Pending);
    h.entitlements.fail_next(1);

    let err = h
        .service
        .handle_paid_signal(signal(id, InvoiceType::Telegram))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Provider(_)), "{err}");

    let p = h.store.purchase(id).unwrap();
    assert_eq!(p.status, PurchaseStatus::Pending);
    assert!(p.paid_at.is_none());
    assert!(h.store.activation_lease(id).is_none(), "lease released after failure");
    assert!(h.store.customer(customer.id).unwrap().subscription_link.is_none());

    // The provider redelivers the callback.
    let again = h
        .service
        .handle_paid_signal(signal(id, InvoiceType::Telegram))
        .await
        .unwrap();
    assert!(matches!(again, ActivationOutcome::Activated(_)), "{again:?}");

    let third = h
        .service
        .handle_paid_signal(signal(id, InvoiceType::Telegram))
        .await
        .unwrap();
    assert_eq!(third, ActivationOutcome::AlreadyPaid);

    // One failed call, one successful one; nothing after Paid.
    assert_eq!(h.entitlements.call_count(), 2);
    assert_eq!(h.store.purchase(id).unwrap().status, PurchaseStatus::Paid);
    assert_eq!(
        h.store.customer(customer.id).unwrap().subscription_link.as_deref(),
        Some("https://sub.example/3003")
    );
}

#[tokio::test]
async fn held_lease_defers_confirmation_and_cancel() {
    let h = Harness::new();
    let customer = h.customer(3008);
    let id = h.seed(&customer, InvoiceType::Crypto, PurchaseStatus::Pending);
    h.store.seed_activation_lease(id, Utc::now());

    let err = h.service.activate(id).await.unwrap_err();
    assert!(matches!(err, PaymentError::ActivationInProgress(_)), "{err}");

    let err = h.service.cancel_purchase(id).await.unwrap_err();
    assert!(matches!(err, PaymentError::ActivationInProgress(_)), "{err}");

    assert_eq!(h.store.purchase(id).unwrap().status, PurchaseStatus::Pending);
    assert_eq!(h.entitlements.call_count(), 0);
}

#[tokio::test]
async fn stale_lease_of_a_dead_attempt_is_taken_over() {
    let h = Harness::new();
    let customer = h.customer(3009);
    let id = h.seed(&customer, InvoiceType::Crypto, PurchaseStatus::Pending);
    h.store.seed_activation_lease(id, Utc::now() - Duration::minutes(10));

    let outcome = h.service.activate(id).await.unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated(_)), "{outcome:?}");
    assert!(h.store.activation_lease(id).is_none());
    assert_eq!(h.store.purchase(id).unwrap().status, PurchaseStatus::Paid);
    assert_eq!(h.entitlements.call_count(), 1);
}

#[tokio::test]
async fn unpersisted_entitlement_keeps_lease_until_stale() {
    let h = Harness::new();
    let customer = h.customer(3010);
    let id = h.seed(&customer, InvoiceType::Crypto, PurchaseStatus::Pending);

    h.store.set_fail_entitlement_writes(true);
    let err = h.service.activate(id).await.unwrap_err();
    assert!(matches!(err, PaymentError::Persistence(_)), "{err}");
    h.store.set_fail_entitlement_writes(false);

    assert_eq!(h.store.purchase(id).unwrap().status, PurchaseStatus::Pending);
    assert!(h.store.activation_lease(id).is_some());

    let err = h.service.activate(id).await.unwrap_err();
    assert!(matches!(err, PaymentError::ActivationInProgress(_)), "{err}");
    assert_eq!(h.entitlements.call_count(), 1);

    // The lease ages out; the next attempt re-runs the panel update.
    h.store.seed_activation_lease(id, Utc::now() - Duration::minutes(10));
    let outcome = h.service.activate(id).await.unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated(_)), "{outcome:?}");
    assert_eq!(h.entitlements.call_count(), 2);
    assert_eq!(h.store.purchase(id).unwrap().status, PurchaseStatus::Paid);
}

#[tokio::test]
async fn entitlement_days_follow_months() {
    let h = Harness::new();
    let customer = h.customer(3004);
    let id = h.store.seed_purchase(shop_schemas::Purchase {
        id: 0,
        customer_id: customer.id,
        invoice_type: InvoiceType::Crypto,
        status: PurchaseStatus::New,
        amount: 12,
        currency: "USD".to_string(),
        months: 6,
        correlation: None,
        created_at: chrono::Utc::now(),
        paid_at: None,
    });

    // A New purchase may be confirmed directly.
    h.service.activate(id).await.unwrap();
    assert_eq!(h.entitlements.calls(), vec![(3004, 100 * GB, 180)]);
}

#[tokio::test]
async fn prompt_is_deleted_and_notification_failure_is_tolerated() {
    let h = Harness::new();
    let customer = h.customer(3005);
    let id = h.seed(&customer, InvoiceType::Crypto, PurchaseStatus::Pending);
    h.service.remember_prompt(id, 555);

    let outcome = h.service.activate(id).await.unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated(_)));
    assert_eq!(h.notifier.deleted(), vec![(3005, 555)]);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, 3005);
    let keyboard = sent[0].keyboard.as_ref().unwrap();
    assert_eq!(keyboard.rows[0][0].callback_data.as_deref(), Some("connect"));
    assert_eq!(keyboard.rows[1][0].callback_data.as_deref(), Some("start"));

    let other = h.seed(&customer, InvoiceType::Crypto, PurchaseStatus::Pending);
    h.notifier.set_fail(true);
    let outcome = h.service.activate(other).await.unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated(_)));
    assert_eq!(h.entitlements.call_count(), 2);
}

#[tokio::test]
async fn callback_for_wrong_invoice_type_is_rejected() {
    let h = Harness::new();
    let customer = h.customer(3006);
    let id = h.seed(&customer, InvoiceType::Yookasa, PurchaseStatus::Pending);

    let err = h
        .service
        .handle_paid_signal(signal(id, InvoiceType::Crypto))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PaymentError::InvoiceTypeMismatch {
            expected: InvoiceType::Yookasa,
            actual: InvoiceType::Crypto,
            ..
        }
    ));
    assert_eq!(h.store.purchase(id).unwrap().status, PurchaseStatus::Pending);
    assert_eq!(h.entitlements.call_count(), 0);
}

#[tokio::test]
async fn unknown_and_cancelled_purchases_are_errors() {
    let h = Harness::new();
    let customer = h.customer(3007);

    let err = h
        .service
        .handle_paid_signal(signal(9_999, InvoiceType::Crypto))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound { entity: "purchase", .. }));

    let id = h.seed(&customer, InvoiceType::Crypto, PurchaseStatus::Cancel);
    let err = h
        .service
        .handle_paid_signal(signal(id, InvoiceType::Crypto))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PaymentError::InvalidTransition {
            from: PurchaseStatus::Cancel,
            to: PurchaseStatus::Paid,
            ..
        }
    ));
    assert_eq!(h.entitlements.call_count(), 0);
}
