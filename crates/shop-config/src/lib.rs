//! shop-config
//!
//! Layered YAML configuration for the shop.
//!
//! Documents are merged in order (earlier = base, later = override), rendered
//! to canonical JSON, hashed, and checked for secret-looking literals before
//! being deserialized into [`ShopConfig`]. Secrets never live in YAML; the
//! YAML names the env vars that hold them (see [`secrets`]).

pub mod secrets;

use std::collections::BTreeMap;
use std::fs;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub use secrets::{resolve_secrets, ResolvedSecrets};

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk_live",    // Rapyd / Stripe style live secret
    "sk_test",    // test secret
    "rak_",       // Rapyd access key
    "live_",      // YooKassa live secret key
    "test_",      // YooKassa test secret key
    "-----BEGIN", // PEM private keys
    "eyJ",        // JWT (Remnawave API token)
];

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub bot: BotConfig,
    pub subscription: SubscriptionConfig,
    pub http: HttpConfig,
    pub prompt_cache: PromptCacheConfig,
    pub providers: ProvidersConfig,
    pub remnawave: RemnawaveConfig,
    pub default_language: String,
    /// Customer-facing texts keyed by language code.
    pub texts: BTreeMap<String, Texts>,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            subscription: SubscriptionConfig::default(),
            http: HttpConfig::default(),
            prompt_cache: PromptCacheConfig::default(),
            providers: ProvidersConfig::default(),
            remnawave: RemnawaveConfig::default(),
            default_language: "en".to_string(),
            texts: BTreeMap::new(),
        }
    }
}

impl ShopConfig {
    /// Texts for `language`, falling back to the default language and then to
    /// the built-in English set.
    pub fn texts_for(&self, language: &str) -> Texts {
        select_texts(&self.texts, &self.default_language, language)
    }
}

/// Pick `language` from a text catalog, falling back to `default_language`
/// and then to the built-in English set.
pub fn select_texts(
    catalog: &BTreeMap<String, Texts>,
    default_language: &str,
    language: &str,
) -> Texts {
    catalog
        .get(language)
        .or_else(|| catalog.get(default_language))
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Public bot URL (`https://t.me/<bot>`); used as provider return URL.
    pub url: String,
    /// When set, the connect button opens this web app instead of a callback.
    pub mini_app_url: Option<String>,
    pub api_base: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            mini_app_url: None,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub traffic_limit_gb: u64,
    pub referral_days: i64,
    /// 0 disables trials.
    pub trial_days: i64,
    pub trial_traffic_limit_gb: u64,
    /// Seconds an activation (or referral bonus) attempt may hold its lease
    /// before another attempt takes it over.
    pub activation_lease_secs: u64,
}

impl SubscriptionConfig {
    pub fn traffic_limit_bytes(&self) -> u64 {
        self.traffic_limit_gb * BYTES_PER_GB
    }

    pub fn trial_traffic_limit_bytes(&self) -> u64 {
        self.trial_traffic_limit_gb * BYTES_PER_GB
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            traffic_limit_gb: 0,
            referral_days: 7,
            trial_days: 0,
            trial_traffic_limit_gb: 0,
            activation_lease_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout applied to every outbound provider/panel/bot call.
    pub timeout_secs: u64,
    /// Budget for the whole cancel-purchase operation.
    pub cancel_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            cancel_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptCacheConfig {
    pub ttl_secs: u64,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub cryptopay: CryptoPayConfig,
    pub yookassa: YookassaConfig,
    pub telegram_stars: TelegramStarsConfig,
    pub rapyd: RapydConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CryptoPayConfig {
    pub enabled: bool,
    pub base_url: String,
}

impl Default for CryptoPayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://pay.crypt.bot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YookassaConfig {
    pub enabled: bool,
    pub base_url: String,
}

impl Default for YookassaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.yookassa.ru".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramStarsConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RapydConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Presentation currency requested before negotiation.
    pub currency: String,
}

impl Default for RapydConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://sandboxapi.rapyd.net".to_string(),
            currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemnawaveConfig {
    pub base_url: String,
}

impl Default for RemnawaveConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Customer-facing strings for one language.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Texts {
    pub subscription_activated: String,
    pub referral_bonus_granted: String,
    pub connect_button: String,
    pub back_button: String,
    pub invoice_title: String,
    pub invoice_label: String,
    pub invoice_description: String,
}

impl Default for Texts {
    fn default() -> Self {
        Self {
            subscription_activated: "Your subscription is active.".to_string(),
            referral_bonus_granted: "A friend you invited just subscribed. Bonus days added!"
                .to_string(),
            connect_button: "Connect".to_string(),
            back_button: "Back".to_string(),
            invoice_title: "Subscription".to_string(),
            invoice_label: "Subscription".to_string(),
            invoice_description: "Access subscription".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Deserialize the merged document into the typed config.
    pub fn shop_config(&self) -> Result<ShopConfig> {
        serde_json::from_value(self.config_json.clone()).context("invalid shop config")
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{}/{}", prefix, i), out);
            }
        }
        _ => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
    }
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    // Bot tokens: "<digits>:<35 chars>".
    if let Some((id, rest)) = t.split_once(':') {
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && rest.len() >= 30 {
            return true;
        }
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
