//! Request and response bodies of the shop-daemon HTTP endpoints.
//!
//! No business logic lives here.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// Invoice types with a configured adapter.
    pub providers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// "not_found" | "invalid_transition" | "invoice_type_mismatch" |
    /// "missing_correlation" | "bad_request" | "unauthorized" | ...
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Callbacks / poll / cancel
// ---------------------------------------------------------------------------

/// What a confirmation did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Activated,
    AlreadyPaid,
    NotYetPaid,
    /// The callback was not a paid event.
    Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub outcome: ConfirmationOutcome,
    pub purchase_id: Option<i64>,
    pub subscription_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub purchase_id: i64,
    pub status: String,
}
