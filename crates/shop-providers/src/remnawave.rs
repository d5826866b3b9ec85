//! Remnawave panel: provisions and extends subscription users.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shop_schemas::{mask_half, Entitlement};

use crate::entitlement::EntitlementProvider;
use crate::{truncate_body, ProviderError};

#[derive(Clone)]
pub struct RemnawaveClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PanelResponse<T> {
    response: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelUser {
    pub uuid: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub subscription_url: String,
    pub expire_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUser {
    username: String,
    telegram_id: i64,
    expire_at: DateTime<Utc>,
    traffic_limit_bytes: u64,
    traffic_limit_strategy: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUser<'a> {
    uuid: &'a str,
    expire_at: DateTime<Utc>,
    traffic_limit_bytes: u64,
    status: &'static str,
}

/// New expiry: `days` past the later of `now` and the current expiry.
pub fn extended_expiry(now: DateTime<Utc>, current: Option<DateTime<Utc>>, days: i64) -> DateTime<Utc> {
    let start = match current {
        Some(c) if c > now => c,
        _ => now,
    };
    start + Duration::days(days)
}

impl RemnawaveClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ProviderError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: truncate_body(&text),
            });
        }
        let parsed: PanelResponse<T> = serde_json::from_str(&text)?;
        Ok(parsed.response)
    }

    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<PanelUser>, ProviderError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/users/by-telegram-id/{telegram_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let users: Vec<PanelUser> = Self::read(resp).await?;
        Ok(users.into_iter().next())
    }
}

#[async_trait]
impl EntitlementProvider for RemnawaveClient {
    async fn create_or_update_user(
        &self,
        customer_id: i64,
        telegram_id: i64,
        traffic_limit_bytes: u64,
        days: i64,
    ) -> Result<Entitlement, ProviderError> {
        let now = Utc::now();
        let existing = self.find_by_telegram_id(telegram_id).await?;

        let user: PanelUser = match existing {
            Some(u) => {
                let body = UpdateUser {
                    uuid: &u.uuid,
                    expire_at: extended_expiry(now, Some(u.expire_at), days),
                    traffic_limit_bytes,
                    status: "ACTIVE",
                };
                let resp = self
                    .http
                    .patch(self.url("/api/users"))
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await?;
                let updated: PanelUser = Self::read(resp).await?;
                tracing::info!(customer_id = %mask_half(customer_id), days, "panel user extended");
                updated
            }
            None => {
                let body = CreateUser {
                    username: format!("{customer_id}_{telegram_id}"),
                    telegram_id,
                    expire_at: extended_expiry(now, None, days),
                    traffic_limit_bytes,
                    traffic_limit_strategy: "MONTH",
                    status: "ACTIVE",
                };
                let resp = self
                    .http
                    .post(self.url("/api/users"))
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await?;
                let created: PanelUser = Self::read(resp).await?;
                tracing::info!(customer_id = %mask_half(customer_id), days, "panel user created");
                created
            }
        };

        Ok(Entitlement {
            subscription_url: user.subscription_url,
            expire_at: user.expire_at,
        })
    }
}
