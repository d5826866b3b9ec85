use async_trait::async_trait;
use shop_schemas::Entitlement;

use crate::ProviderError;

/// The panel that provisions access for a customer.
#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    /// Create the panel user or extend the existing one by `days`, counted from
    /// the later of now and the current expiry.
    async fn create_or_update_user(
        &self,
        customer_id: i64,
        telegram_id: i64,
        traffic_limit_bytes: u64,
        days: i64,
    ) -> Result<Entitlement, ProviderError>;
}
