//! Shared state handed to every handler as `State<Arc<AppState>>`.

use shop_payments::PaymentService;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "shop-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Keys used to authenticate inbound provider callbacks.
#[derive(Clone, Default)]
pub struct WebhookKeys {
    /// CryptoPay API token; callbacks must carry a signature keyed by it.
    /// `None` rejects every CryptoPay callback.
    pub cryptopay_token: Option<String>,
    /// Secret registered with `setWebhook`; Telegram echoes it in
    /// `X-Telegram-Bot-Api-Secret-Token`. `None` rejects every update.
    pub telegram_secret_token: Option<String>,
    /// Bearer token for the operator endpoints (poll, cancel). `None` closes
    /// them.
    pub operator_token: Option<String>,
}

impl std::fmt::Debug for WebhookKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("WebhookKeys")
            .field("cryptopay_token", &redact(&self.cryptopay_token))
            .field("telegram_secret_token", &redact(&self.telegram_secret_token))
            .field("operator_token", &redact(&self.operator_token))
            .finish()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub payments: PaymentService,
    pub webhooks: WebhookKeys,
}

impl AppState {
    pub fn new(payments: PaymentService, webhooks: WebhookKeys) -> Self {
        Self {
            build: BuildInfo::default(),
            payments,
            webhooks,
        }
    }
}
