//! Rapyd hosted checkout: signing, negotiation, and the HTTP client.

mod client;
pub mod models;
pub mod negotiate;
pub mod signing;

pub use client::RapydClient;
pub use negotiate::{candidate_countries, negotiate, Negotiated, PaymentMethodSource};
