//! shop-daemon entry point.
//!
//! Thin on purpose: tracing, config, wiring, middleware, serve. Handlers live
//! in `routes.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use shop_daemon::{routes, state};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

const ENV_CONFIG_PATHS: &str = "SHOP_CONFIG_PATHS";
const ENV_DAEMON_ADDR: &str = "SHOP_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = config_paths_from_env();
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = shop_config::load_layered_yaml(&path_refs)?;
    let cfg = loaded.shop_config()?;
    let secrets = shop_config::resolve_secrets(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let pool = shop_db::connect_from_env().await?;
    let payments = shop_payments::build_live_service(&cfg, &secrets, pool)?;

    let webhooks = state::WebhookKeys {
        cryptopay_token: secrets.cryptopay_token.clone(),
        telegram_secret_token: secrets.telegram_webhook_secret.clone(),
        operator_token: secrets.operator_token.clone(),
    };
    if webhooks.operator_token.is_none() {
        tracing::warn!("no operator token configured; poll and cancel endpoints are closed");
    }
    let shared = Arc::new(state::AppState::new(payments, webhooks));

    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("shop-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Comma-separated YAML layers, base first.
fn config_paths_from_env() -> Vec<String> {
    std::env::var(ENV_CONFIG_PATHS)
        .unwrap_or_else(|_| "config/base.yaml".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
