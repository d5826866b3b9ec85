//! Scenario: a Telegram Stars purchase through the real Bot API client
//! (against a mock server) is recorded in STARS, Pending, with the invoice
//! link as its redirect URL.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use shop_payments::PurchaseRequest;
use shop_providers::telegram::TelegramBot;
use shop_schemas::{InvoiceType, PurchaseStatus};
use shop_testkit::Harness;

#[tokio::test]
async fn stars_purchase_is_pending_with_invoice_link() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/bot777:TEST/createInvoiceLink")
                .json_body_partial(r#"{ "currency": "XTR", "title": "Subscription" }"#);
            then.status(200)
                .json_body(json!({ "ok": true, "result": "https://t.me/$stars-link" }));
        })
        .await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let bot = Arc::new(TelegramBot::new(http, server.base_url(), "777:TEST"));
    let h = Harness::with_adapter(bot);
    let customer = h.customer(2001);

    let (link, id) = h
        .service
        .create_purchase(
            &customer,
            &PurchaseRequest {
                amount: 250,
                months: 1,
                invoice_type: InvoiceType::Telegram,
                username: "bob".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(link, "https://t.me/$stars-link");
    let p = h.store.purchase(id).unwrap();
    assert_eq!(p.status, PurchaseStatus::Pending);
    assert_eq!(p.currency, "STARS");
    assert_eq!(p.amount, 250);
    assert_eq!(p.external_id(), Some(format!("{id}&bob").as_str()));
    m.assert_async().await;
}
