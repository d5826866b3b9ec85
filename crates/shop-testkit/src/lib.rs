//! shop-testkit
//!
//! In-memory stores and scripted provider fakes for driving the payment core
//! end to end without Postgres or the network. Scenario tests live under
//! `tests/`.

pub mod fakes;
pub mod harness;
pub mod memory;

pub use fakes::{
    FakeCheckout, FakeEntitlements, FakePaymentLookup, FakeStatusSource, RecordingNotifier,
    SentMessage,
};
pub use harness::{succeeded_payment, test_settings, Harness, GB};
pub use memory::MemoryStore;
