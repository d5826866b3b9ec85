use async_trait::async_trait;
use shop_schemas::Keyboard;

use crate::ProviderError;

/// Outbound chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ProviderError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ProviderError>;
}
