//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES under `secrets_env` (e.g.
//! `"SHOP_RAPYD_SECRET_KEY"`). Callers resolve once at startup and pass the
//! resulting [`ResolvedSecrets`] into constructors. `Debug` redacts values and
//! errors name the variable, never its content.
//!
//! | Secret                      | Required when                  |
//! |-----------------------------|--------------------------------|
//! | telegram bot token          | always                         |
//! | remnawave token             | always                         |
//! | cryptopay token             | `providers.cryptopay.enabled`  |
//! | yookassa shop id + key      | `providers.yookassa.enabled`   |
//! | rapyd access + secret key   | `providers.rapyd.enabled`      |
//! | telegram webhook secret     | `providers.telegram_stars.enabled` |
//! | operator token              | never (operator routes closed) |

use anyhow::{bail, Result};
use serde_json::Value;

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub telegram_bot_token: String,
    pub remnawave_token: String,
    pub cryptopay_token: Option<String>,
    pub yookassa_shop_id: Option<String>,
    pub yookassa_secret_key: Option<String>,
    pub rapyd_access_key: Option<String>,
    pub rapyd_secret_key: Option<String>,
    /// Echoed by Telegram in `X-Telegram-Bot-Api-Secret-Token`.
    pub telegram_webhook_secret: Option<String>,
    /// Bearer token of the daemon's operator endpoints.
    pub operator_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("ResolvedSecrets")
            .field("telegram_bot_token", &"<REDACTED>")
            .field("remnawave_token", &"<REDACTED>")
            .field("cryptopay_token", &redact(&self.cryptopay_token))
            .field("yookassa_shop_id", &redact(&self.yookassa_shop_id))
            .field("yookassa_secret_key", &redact(&self.yookassa_secret_key))
            .field("rapyd_access_key", &redact(&self.rapyd_access_key))
            .field("rapyd_secret_key", &redact(&self.rapyd_secret_key))
            .field("telegram_webhook_secret", &redact(&self.telegram_webhook_secret))
            .field("operator_token", &redact(&self.operator_token))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct SecretEnvNames {
    telegram_bot_token: String,
    remnawave_token: String,
    cryptopay_token: String,
    yookassa_shop_id: String,
    yookassa_secret_key: String,
    rapyd_access_key: String,
    rapyd_secret_key: String,
    telegram_webhook_secret: String,
    operator_token: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_bool_at(config: &Value, pointer: &str) -> bool {
    config
        .pointer(pointer)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_name(config_json: &Value, key: &str, default: &str) -> String {
    read_str_at(config_json, &format!("/secrets_env/{key}")).unwrap_or_else(|| default.to_string())
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        telegram_bot_token: env_name(config_json, "telegram_bot_token", "SHOP_TELEGRAM_TOKEN"),
        remnawave_token: env_name(config_json, "remnawave_token", "SHOP_REMNAWAVE_TOKEN"),
        cryptopay_token: env_name(config_json, "cryptopay_token", "SHOP_CRYPTOPAY_TOKEN"),
        yookassa_shop_id: env_name(config_json, "yookassa_shop_id", "SHOP_YOOKASSA_SHOP_ID"),
        yookassa_secret_key: env_name(
            config_json,
            "yookassa_secret_key",
            "SHOP_YOOKASSA_SECRET_KEY",
        ),
        rapyd_access_key: env_name(config_json, "rapyd_access_key", "SHOP_RAPYD_ACCESS_KEY"),
        rapyd_secret_key: env_name(config_json, "rapyd_secret_key", "SHOP_RAPYD_SECRET_KEY"),
        telegram_webhook_secret: env_name(
            config_json,
            "telegram_webhook_secret",
            "SHOP_TELEGRAM_WEBHOOK_SECRET",
        ),
        operator_token: env_name(config_json, "operator_token", "SHOP_OPERATOR_TOKEN"),
    }
}

fn require(var_name: &str, what: &str) -> Result<String> {
    match resolve_env(var_name) {
        Some(v) => Ok(v),
        None => bail!(
            "SECRETS_MISSING: required env var '{}' ({}) is not set or empty",
            var_name,
            what,
        ),
    }
}

fn require_if(enabled: bool, var_name: &str, what: &str) -> Result<Option<String>> {
    if enabled {
        require(var_name, what).map(Some)
    } else {
        Ok(resolve_env(var_name))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve every secret named by the loaded config JSON.
///
/// # Errors
/// The first missing required variable, reported by NAME.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let telegram_bot_token = require(&names.telegram_bot_token, "telegram bot token")?;
    let remnawave_token = require(&names.remnawave_token, "remnawave token")?;

    let cryptopay_token = require_if(
        read_bool_at(config_json, "/providers/cryptopay/enabled"),
        &names.cryptopay_token,
        "cryptopay token",
    )?;

    let yookassa_enabled = read_bool_at(config_json, "/providers/yookassa/enabled");
    let yookassa_shop_id = require_if(yookassa_enabled, &names.yookassa_shop_id, "yookassa shop id")?;
    let yookassa_secret_key = require_if(
        yookassa_enabled,
        &names.yookassa_secret_key,
        "yookassa secret key",
    )?;

    let rapyd_enabled = read_bool_at(config_json, "/providers/rapyd/enabled");
    let rapyd_access_key = require_if(rapyd_enabled, &names.rapyd_access_key, "rapyd access key")?;
    let rapyd_secret_key = require_if(rapyd_enabled, &names.rapyd_secret_key, "rapyd secret key")?;

    let telegram_webhook_secret = require_if(
        read_bool_at(config_json, "/providers/telegram_stars/enabled"),
        &names.telegram_webhook_secret,
        "telegram webhook secret",
    )?;
    let operator_token = resolve_env(&names.operator_token);

    Ok(ResolvedSecrets {
        telegram_bot_token,
        remnawave_token,
        cryptopay_token,
        yookassa_shop_id,
        yookassa_secret_key,
        rapyd_access_key,
        rapyd_secret_key,
        telegram_webhook_secret,
        operator_token,
    })
}
