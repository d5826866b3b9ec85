//! Axum router and handlers for shop-daemon.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! after it so tests can drive the bare router.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use shop_payments::{ActivationOutcome, PaidSignal, PaymentError, PollOutcome};
use shop_providers::{constant_time_eq, cryptopay, telegram, yookassa, ProviderError};
use shop_schemas::{mask_half, InvoiceType};

use crate::api_types::{
    CancelResponse, ConfirmationOutcome, ConfirmationResponse, ErrorResponse, HealthResponse,
};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/callbacks/cryptopay", post(cryptopay_callback))
        .route("/v1/callbacks/yookassa", post(yookassa_callback))
        .route("/v1/callbacks/telegram", post(telegram_callback))
        .route("/v1/purchases/:id/poll", post(poll_purchase))
        .route("/v1/purchases/:id/cancel", post(cancel_purchase))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_body(status: StatusCode, kind: &str, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            kind: kind.to_string(),
        }),
    )
        .into_response()
}

fn payment_error(e: PaymentError) -> Response {
    let (status, kind) = match &e {
        PaymentError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        PaymentError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        PaymentError::InvoiceTypeMismatch { .. } => (StatusCode::CONFLICT, "invoice_type_mismatch"),
        PaymentError::MissingCorrelation(_) => (StatusCode::CONFLICT, "missing_correlation"),
        PaymentError::ActivationInProgress(_) => (StatusCode::CONFLICT, "activation_in_progress"),
        PaymentError::PaymentMismatch { .. } => (StatusCode::CONFLICT, "payment_mismatch"),
        PaymentError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider"),
        PaymentError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        PaymentError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
        PaymentError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence"),
    };
    if status.is_server_error() {
        tracing::error!(error = %e, kind, "request failed");
    } else {
        tracing::warn!(error = %e, kind, "request rejected");
    }
    error_body(status, kind, e.to_string())
}

fn unauthorized(message: &str) -> Response {
    error_body(StatusCode::UNAUTHORIZED, "unauthorized", message.to_string())
}

fn bad_payload(e: ProviderError) -> Response {
    tracing::warn!(error = %e, "callback payload rejected");
    error_body(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
}

fn confirmation(purchase_id: i64, outcome: ActivationOutcome) -> Response {
    confirmation_response(Some(purchase_id), outcome.into())
}

fn confirmation_response(purchase_id: Option<i64>, outcome: PollOutcome) -> Response {
    let (outcome, subscription_url) = match outcome {
        PollOutcome::AlreadyPaid => (ConfirmationOutcome::AlreadyPaid, None),
        PollOutcome::NotYetPaid => (ConfirmationOutcome::NotYetPaid, None),
        PollOutcome::Activated(a) => (ConfirmationOutcome::Activated, Some(a.subscription_url)),
    };
    (
        StatusCode::OK,
        Json(ConfirmationResponse {
            outcome,
            purchase_id,
            subscription_url,
        }),
    )
        .into_response()
}

fn ignored() -> Response {
    (
        StatusCode::OK,
        Json(ConfirmationResponse {
            outcome: ConfirmationOutcome::Ignored,
            purchase_id: None,
            subscription_url: None,
        }),
    )
        .into_response()
}

async fn confirm(st: &AppState, parsed: Result<Option<PaidSignal>, ProviderError>) -> Response {
    let signal = match parsed {
        Ok(Some(signal)) => signal,
        Ok(None) => return ignored(),
        Err(e) => return bad_payload(e),
    };
    let purchase_id = signal.purchase_id;
    tracing::info!(
        purchase_id = %mask_half(purchase_id),
        invoice_type = %signal.invoice_type,
        "paid callback"
    );
    match st.payments.handle_paid_signal(signal).await {
        Ok(outcome) => confirmation(purchase_id, outcome),
        Err(e) => payment_error(e),
    }
}

/// `Authorization: Bearer <operator token>`; closed when no token is set.
fn require_operator(st: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = st.webhooks.operator_token.as_deref() else {
        return Err(unauthorized("operator endpoints are not configured"));
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(token) if constant_time_eq(expected.as_bytes(), token.as_bytes()) => Ok(()),
        _ => {
            tracing::warn!("operator request without a valid token");
            Err(unauthorized("missing or invalid operator token"))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            providers: st
                .payments
                .enabled_invoice_types()
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/callbacks/*
// ---------------------------------------------------------------------------

/// CryptoPay webhook. The body is only parsed after its signature checks out.
pub(crate) async fn cryptopay_callback(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(token) = st.webhooks.cryptopay_token.as_deref() else {
        return unauthorized("cryptopay callbacks are not configured");
    };
    let signature = headers
        .get(cryptopay::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !cryptopay::verify_webhook_signature(token, &body, signature) {
        tracing::warn!("cryptopay callback with bad signature");
        return unauthorized("bad signature");
    }
    let parsed = cryptopay::parse_paid_webhook(&body)
        .map(|id| id.map(|id| PaidSignal::new(id, InvoiceType::Crypto)));
    confirm(&st, parsed).await
}

/// YooKassa notification. The body only names a payment; the payment itself
/// is re-fetched from YooKassa before anything is activated.
pub(crate) async fn yookassa_callback(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let payment_id = match yookassa::parse_succeeded_notification(&body) {
        Ok(Some(id)) => id,
        Ok(None) => return ignored(),
        Err(e) => return bad_payload(e),
    };
    tracing::info!(invoice_type = %InvoiceType::Yookasa, "paid notification");
    match st
        .payments
        .confirm_remote_payment(InvoiceType::Yookasa, &payment_id)
        .await
    {
        Ok(outcome) => confirmation_response(None, outcome),
        Err(e) => payment_error(e),
    }
}

/// Telegram update. Requires the webhook secret token; the Stars amount is
/// checked against the ledger.
pub(crate) async fn telegram_callback(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let expected = st.webhooks.telegram_secret_token.as_deref().unwrap_or_default();
    let presented = headers
        .get(telegram::SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if !telegram::verify_secret_token(expected, presented) {
        tracing::warn!("telegram update without a valid secret token");
        return unauthorized("bad secret token");
    }
    let parsed = telegram::parse_successful_payment(&body).map(|p| {
        p.map(|p| {
            let currency = if p.currency == telegram::STARS_CURRENCY {
                InvoiceType::Telegram.ledger_currency().to_string()
            } else {
                p.currency
            };
            PaidSignal::new(p.purchase_id, InvoiceType::Telegram).with_amount(p.total_amount, currency)
        })
    });
    confirm(&st, parsed).await
}

// ---------------------------------------------------------------------------
// POST /v1/purchases/:id/{poll,cancel}
// ---------------------------------------------------------------------------

pub(crate) async fn poll_purchase(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = require_operator(&st, &headers) {
        return denied;
    }
    match st.payments.poll_checkout(id).await {
        Ok(outcome) => confirmation_response(Some(id), outcome),
        Err(e) => payment_error(e),
    }
}

pub(crate) async fn cancel_purchase(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = require_operator(&st, &headers) {
        return denied;
    }
    match st.payments.cancel_purchase(id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(CancelResponse {
                purchase_id: id,
                status: "cancel".to_string(),
            }),
        )
            .into_response(),
        Err(e) => payment_error(e),
    }
}
