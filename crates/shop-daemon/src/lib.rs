//! shop-daemon library target.
//!
//! Exposes the router and state for integration tests; `main.rs` depends on
//! it.

pub mod api_types;
pub mod routes;
pub mod state;
