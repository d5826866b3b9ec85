//! Scenario: the referrer is credited once, on the referee's first paid
//! purchase, and operator re-runs are no-ops. A failed extension leaves the
//! referral ungranted so a re-run still credits it, once.

use shop_payments::{ActivationOutcome, ReferralOutcome};
use shop_schemas::{InvoiceType, PurchaseStatus};
use shop_testkit::{Harness, GB};

#[tokio::test]
async fn first_activation_credits_referrer_once() {
    let h = Harness::new();
    let referrer = h.customer(4001);
    let referee = h.customer(4002);
    let referral_id = h.store.add_referral(referrer.telegram_id, referee.telegram_id);

    let first = h.seed(&referee, InvoiceType::Crypto, PurchaseStatus::Pending);
    let ActivationOutcome::Activated(a) = h.service.activate(first).await.unwrap() else {
        panic!("expected activation");
    };
    assert_eq!(
        a.referral,
        ReferralOutcome::Granted {
            referrer_telegram_id: 4001
        }
    );
    assert!(h.store.referral(referral_id).unwrap().bonus_granted);

    let second = h.seed(&referee, InvoiceType::Crypto, PurchaseStatus::Pending);
    let ActivationOutcome::Activated(b) = h.service.activate(second).await.unwrap() else {
        panic!("expected activation");
    };
    assert_eq!(b.referral, ReferralOutcome::AlreadyGranted);

    assert_eq!(
        h.entitlements.calls(),
        vec![(4002, 100 * GB, 30), (4001, 100 * GB, 7), (4002, 100 * GB, 30)]
    );

    let r = h.store.customer(referrer.id).unwrap();
    assert_eq!(r.subscription_link.as_deref(), Some("https://sub.example/4001"));

    let to_referrer: Vec<_> = h
        .notifier
        .sent()
        .into_iter()
        .filter(|m| m.chat_id == 4001)
        .collect();
    assert_eq!(to_referrer.len(), 1);
}

#[tokio::test]
async fn manual_credit_is_idempotent() {
    let h = Harness::new();
    let referrer = h.customer(4011);
    let referee = h.customer(4012);
    h.store.add_referral(referrer.telegram_id, referee.telegram_id);

    let a = h.service.credit_referral(4012).await.unwrap();
    let b = h.service.credit_referral(4012).await.unwrap();
    assert!(matches!(a, ReferralOutcome::Granted { .. }));
    assert_eq!(b, ReferralOutcome::AlreadyGranted);
    assert_eq!(h.entitlements.call_count(), 1);
}

#[tokio::test]
async fn concurrent_credits_claim_flag_once() {
    let h = Harness::new();
    let referrer = h.customer(4021);
    let referee = h.customer(4022);
    h.store.add_referral(referrer.telegram_id, referee.telegram_id);

    let (a, b) = tokio::join!(h.service.credit_referral(4022), h.service.credit_referral(4022));
    let granted = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| matches!(o, ReferralOutcome::Granted { .. }))
        .count();
    assert_eq!(granted, 1);
    assert_eq!(h.entitlements.call_count(), 1);
}

#[tokio::test]
async fn no_referral_is_a_noop() {
    let h = Harness::new();
    let customer = h.customer(4031);
    let id = h.seed(&customer, InvoiceType::Yookasa, PurchaseStatus::Pending);

    let ActivationOutcome::Activated(a) = h.service.activate(id).await.unwrap() else {
        panic!("expected activation");
    };
    assert_eq!(a.referral, ReferralOutcome::NoReferral);
    assert_eq!(h.entitlements.call_count(), 1);
}

#[tokio::test]
async fn failed_extension_is_credited_once_on_retry() {
    let h = Harness::new();
    let referrer = h.customer(4051);
    let referee = h.customer(4052);
    let referral_id = h.store.add_referral(referrer.telegram_id, referee.telegram_id);
    h.entitlements.fail_next(1);

    let err = h.service.credit_referral(4052).await.unwrap_err();
    assert!(matches!(err, shop_payments::PaymentError::Provider(_)), "{err}");
    assert!(!h.store.referral(referral_id).unwrap().bonus_granted);
    assert!(h.store.bonus_lease(referral_id).is_none());

    let retry = h.service.credit_referral(4052).await.unwrap();
    assert_eq!(
        retry,
        ReferralOutcome::Granted {
            referrer_telegram_id: 4051
        }
    );
    assert_eq!(
        h.service.credit_referral(4052).await.unwrap(),
        ReferralOutcome::AlreadyGranted
    );

    assert!(h.store.referral(referral_id).unwrap().bonus_granted);
    // One failed and one successful extension of the referrer.
    assert_eq!(
        h.entitlements.calls(),
        vec![(4051, 100 * GB, 7), (4051, 100 * GB, 7)]
    );
    let r = h.store.customer(referrer.id).unwrap();
    assert_eq!(r.subscription_link.as_deref(), Some("https://sub.example/4051"));
}

#[tokio::test]
async fn referral_failure_propagates_but_keeps_activation() {
    let h = Harness::new();
    let referrer = h.customer(4061);
    let referee = h.customer(4062);
    let referral_id = h.store.add_referral(referrer.telegram_id, referee.telegram_id);
    let id = h.seed(&referee, InvoiceType::Crypto, PurchaseStatus::Pending);

    // Referee's grant succeeds, the referrer's extension fails.
    h.entitlements.fail_for(referrer.telegram_id, 1);
    let err = h.service.activate(id).await.unwrap_err();
    assert!(matches!(err, shop_payments::PaymentError::Provider(_)), "{err}");

    assert_eq!(h.store.purchase(id).unwrap().status, PurchaseStatus::Paid);
    assert_eq!(
        h.store.customer(referee.id).unwrap().subscription_link.as_deref(),
        Some("https://sub.example/4062")
    );
    assert!(!h.store.referral(referral_id).unwrap().bonus_granted);

    // A replayed confirmation does not extend the referee again.
    assert_eq!(h.service.activate(id).await.unwrap(), ActivationOutcome::AlreadyPaid);

    // The operator re-run credits the referrer once.
    assert!(matches!(
        h.service.credit_referral(4062).await.unwrap(),
        ReferralOutcome::Granted { .. }
    ));
    assert_eq!(
        h.entitlements.calls(),
        vec![(4062, 100 * GB, 30), (4061, 100 * GB, 7), (4061, 100 * GB, 7)]
    );
}

#[tokio::test]
async fn missing_referrer_customer_is_not_found() {
    let h = Harness::new();
    h.customer(4042);
    h.store.add_referral(4041, 4042);

    let err = h.service.credit_referral(4042).await.unwrap_err();
    assert!(matches!(
        err,
        shop_payments::PaymentError::NotFound {
            entity: "referrer",
            ..
        }
    ));
    assert_eq!(h.entitlements.call_count(), 0);
}
