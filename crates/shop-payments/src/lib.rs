//! shop-payments
//!
//! Payment lifecycle core. A purchase is opened through the adapter of its
//! invoice type, confirmed by a provider callback or a status poll, and
//! activated exactly once: an activation lease is taken by a conditional
//! ledger write before the entitlement call, and `Paid` is committed only
//! after the entitlement is persisted. A failed attempt releases the lease
//! and leaves the purchase open for a retry.
//!
//! Everything outside the core (stores, checkout APIs, the entitlement
//! panel, chat notifications, the prompt cache) is injected through
//! [`ServiceDeps`], so the whole flow runs against in-memory fakes in tests.

pub mod activation;
pub mod error;
pub mod factory;
pub mod keyboard;
pub mod ledger;
pub mod prompt_cache;
pub mod reconciler;
pub mod referral;
pub mod service;
pub mod wiring;

pub use activation::{Activation, ActivationOutcome};
pub use error::PaymentError;
pub use factory::{parse_invoice_type, InvoiceFactory, PurchaseRequest};
pub use keyboard::connect_keyboard;
pub use ledger::{ActivationClaim, Ledger};
pub use prompt_cache::{MemoryPromptCache, PromptCache};
pub use reconciler::{PaidAmount, PaidSignal, PollOutcome};
pub use referral::ReferralOutcome;
pub use service::{PaymentService, ServiceDeps, ServiceSettings};
pub use wiring::build_live_service;
