//! Production wiring: Postgres stores plus the HTTP integrations enabled in
//! config.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shop_config::{ResolvedSecrets, ShopConfig};
use shop_db::PgStore;
use shop_providers::cryptopay::CryptoPayClient;
use shop_providers::rapyd::RapydClient;
use shop_providers::remnawave::RemnawaveClient;
use shop_providers::telegram::TelegramBot;
use shop_providers::yookassa::YookassaClient;
use shop_providers::{http_client, CheckoutStatusSource, PaymentLookup, StaticRateTable};
use shop_schemas::InvoiceType;
use sqlx::PgPool;

use crate::factory::InvoiceFactory;
use crate::ledger::Ledger;
use crate::prompt_cache::MemoryPromptCache;
use crate::service::{PaymentService, ServiceDeps, ServiceSettings};

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .with_context(|| format!("{what} is required by an enabled provider"))
}

pub fn build_live_service(
    cfg: &ShopConfig,
    secrets: &ResolvedSecrets,
    pool: PgPool,
) -> Result<PaymentService> {
    let http = http_client(Duration::from_secs(cfg.http.timeout_secs))
        .context("http client")?;
    let store = Arc::new(PgStore::new(pool));

    let bot = Arc::new(TelegramBot::new(
        http.clone(),
        cfg.bot.api_base.clone(),
        secrets.telegram_bot_token.clone(),
    ));

    let mut factory = InvoiceFactory::new();
    let mut status_source: Option<Arc<dyn CheckoutStatusSource>> = None;
    let mut payment_lookups: BTreeMap<InvoiceType, Arc<dyn PaymentLookup>> = BTreeMap::new();

    let p = &cfg.providers;
    if p.cryptopay.enabled {
        factory.register(Arc::new(CryptoPayClient::new(
            http.clone(),
            p.cryptopay.base_url.clone(),
            required(&secrets.cryptopay_token, "cryptopay token")?,
            cfg.bot.url.clone(),
        )));
    }
    if p.yookassa.enabled {
        let yookassa = Arc::new(YookassaClient::new(
            http.clone(),
            p.yookassa.base_url.clone(),
            required(&secrets.yookassa_shop_id, "yookassa shop id")?,
            required(&secrets.yookassa_secret_key, "yookassa secret key")?,
            cfg.bot.url.clone(),
        ));
        factory.register(yookassa.clone());
        payment_lookups.insert(InvoiceType::Yookasa, yookassa as Arc<dyn PaymentLookup>);
    }
    if p.telegram_stars.enabled {
        factory.register(bot.clone());
    }
    if p.rapyd.enabled {
        let rapyd = Arc::new(
            RapydClient::new(
                http.clone(),
                p.rapyd.base_url.clone(),
                required(&secrets.rapyd_access_key, "rapyd access key")?,
                required(&secrets.rapyd_secret_key, "rapyd secret key")?,
                Arc::new(StaticRateTable::default()),
            )
            .with_presentation_currency(p.rapyd.currency.clone())
            .with_return_url(cfg.bot.url.clone()),
        );
        factory.register(rapyd.clone());
        status_source = Some(rapyd as Arc<dyn CheckoutStatusSource>);
    }

    let entitlements = Arc::new(RemnawaveClient::new(
        http,
        cfg.remnawave.base_url.clone(),
        secrets.remnawave_token.clone(),
    ));

    tracing::info!(providers = ?factory.enabled(), "payment service wired");

    let deps = ServiceDeps {
        ledger: Ledger::new(store.clone()),
        customers: store.clone(),
        referrals: store,
        factory,
        status_source,
        payment_lookups,
        entitlements,
        notifier: bot,
        prompts: Arc::new(MemoryPromptCache::new(Duration::from_secs(
            cfg.prompt_cache.ttl_secs,
        ))),
    };
    Ok(PaymentService::new(deps, ServiceSettings::from_config(cfg)))
}
