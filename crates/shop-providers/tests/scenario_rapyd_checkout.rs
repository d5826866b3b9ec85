//! Scenario: Rapyd checkout creation over HTTP.
//!
//! - Every request carries the signing headers.
//! - Negotiation skips countries without an active card method.
//! - When no candidate matches, the checkout is still created in EUR/DE.
//! - Checkout status maps COMPLETED / CLO to paid.

use std::sync::Arc;
use std::time::Duration;

use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use shop_providers::rapyd::RapydClient;
use shop_providers::{CheckoutClient, CheckoutStatusSource, InvoiceRequest, StaticRateTable};

fn client(server: &MockServer) -> RapydClient {
    let http = shop_providers::http_client(Duration::from_secs(5)).unwrap();
    RapydClient::new(
        http,
        server.base_url(),
        "rak_test_access",
        "rsk_test_secret",
        Arc::new(StaticRateTable::default()),
    )
}

fn request(amount: i64) -> InvoiceRequest {
    InvoiceRequest {
        purchase_id: 501,
        customer_id: 77,
        amount,
        currency: "USD".to_string(),
        months: 3,
        title: String::new(),
        label: String::new(),
        description: String::new(),
        username: "dave".to_string(),
    }
}

fn methods(cards: &[(&str, i64)]) -> serde_json::Value {
    let data: Vec<_> = cards
        .iter()
        .map(|(category, status)| {
            json!({ "type": "xx_card", "name": "Card", "category": category, "status": status })
        })
        .collect();
    json!({ "status": { "status": "SUCCESS" }, "data": data })
}

#[tokio::test]
async fn checkout_uses_first_country_with_active_card() {
    let server = MockServer::start_async().await;

    let gb = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/payment_methods/countries/GB")
                .query_param("currency", "USD")
                .header_exists("signature")
                .header_exists("salt")
                .header_exists("timestamp")
                .header("access_key", "rak_test_access");
            then.status(200).json_body(methods(&[("ewallet", 1), ("card", 0)]));
        })
        .await;
    let de = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/payment_methods/countries/DE");
            then.status(400).json_body(json!({
                "status": { "status": "ERROR", "error_code": "ERROR_GET_PAYMENT_METHODS", "message": "nope" }
            }));
        })
        .await;
    let ca = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/payment_methods/countries/CA");
            then.status(200).json_body(methods(&[("card", 1)]));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/checkout")
                .header_exists("signature")
                .json_body_partial(
                    r#"{
                        "amount": 12,
                        "currency": "USD",
                        "country": "CA",
                        "merchant_reference_id": "purchase_501",
                        "payment_method": { "type": "any" },
                        "metadata": { "purchase_id": "501", "customer_id": "77", "base_currency": "USD" }
                    }"#,
                );
            then.status(200).json_body(json!({
                "status": { "status": "SUCCESS" },
                "data": {
                    "id": "checkout_abc",
                    "status": "NEW",
                    "redirect_url": "https://sandboxcheckout.rapyd.net/?token=checkout_abc",
                    "country": "CA",
                    "currency": "USD",
                    "amount": 12
                }
            }));
        })
        .await;

    let checkout = client(&server).create_invoice(&request(12)).await.unwrap();

    assert_eq!(checkout.external_id, "checkout_abc");
    assert!(!checkout.redirect_url.is_empty());
    assert_eq!(checkout.country.as_deref(), Some("CA"));
    assert_eq!(checkout.currency, "USD");
    assert_eq!(checkout.amount, 12);

    gb.assert_async().await;
    de.assert_async().await;
    ca.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn checkout_falls_back_to_eur_de_when_no_country_matches() {
    let server = MockServer::start_async().await;

    let lookups = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/v1/payment_methods/countries/");
            then.status(200).json_body(methods(&[]));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/checkout")
                .json_body_partial(r#"{ "amount": 17, "currency": "EUR", "country": "DE" }"#);
            then.status(200).json_body(json!({
                "status": { "status": "SUCCESS" },
                "data": { "id": "checkout_eur", "status": "NEW", "redirect_url": "https://pay.example/eur" }
            }));
        })
        .await;

    let checkout = client(&server).create_invoice(&request(20)).await.unwrap();

    assert_eq!(checkout.external_id, "checkout_eur");
    assert_eq!(checkout.currency, "EUR");
    assert_eq!(checkout.country.as_deref(), Some("DE"));
    assert_eq!(checkout.amount, 17);
    assert_eq!(lookups.hits_async().await, 5);
    create.assert_async().await;
}

#[tokio::test]
async fn checkout_error_envelope_surfaces_as_api_error() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/v1/payment_methods/countries/");
            then.status(200).json_body(methods(&[("card", 1)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/checkout");
            then.status(401).json_body(json!({
                "status": { "status": "ERROR", "error_code": "UNAUTHENTICATED_API_CALL", "message": "bad signature" }
            }));
        })
        .await;

    let err = client(&server).create_invoice(&request(5)).await.unwrap_err();
    match err {
        shop_providers::ProviderError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("UNAUTHENTICATED_API_CALL"), "{message}");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn checkout_status_reports_payment_closure() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/checkout/checkout_paid")
                .header_exists("signature");
            then.status(200).json_body(json!({
                "status": { "status": "SUCCESS" },
                "data": { "id": "checkout_paid", "status": "NEW", "payment": { "id": "payment_1", "status": "CLO" } }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/checkout/checkout_open");
            then.status(200).json_body(json!({
                "status": { "status": "SUCCESS" },
                "data": { "id": "checkout_open", "status": "NEW" }
            }));
        })
        .await;

    let c = client(&server);
    let paid = c.checkout_status("checkout_paid").await.unwrap();
    assert!(paid.is_paid());
    assert_eq!(paid.payment_status.as_deref(), Some("CLO"));

    let open = c.checkout_status("checkout_open").await.unwrap();
    assert!(!open.is_paid());
    assert_eq!(open.payment_status, None);
}
