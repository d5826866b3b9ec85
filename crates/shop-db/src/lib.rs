use std::collections::BTreeMap;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod pg;
pub mod store;

pub use pg::{correlation_columns, PgStore};
pub use store::{CustomerStore, PurchaseStore, ReferralStore};

pub const ENV_DB_URL: &str = "SHOP_DATABASE_URL";
/// Optional pool size override; the payment core holds no connection across
/// a provider call, so a small pool serves many concurrent callbacks.
pub const ENV_DB_MAX_CONNECTIONS: &str = "SHOP_DB_MAX_CONNECTIONS";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Tables the payment core reads and writes.
pub const SHOP_TABLES: [&str; 3] = ["customer", "purchase", "referral"];

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open the shop database pool.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to the shop database")
}

/// Open the pool named by `SHOP_DATABASE_URL`, sized by
/// `SHOP_DB_MAX_CONNECTIONS` when set.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    let max_connections = match std::env::var(ENV_DB_MAX_CONNECTIONS) {
        Ok(v) => v
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .with_context(|| format!("{ENV_DB_MAX_CONNECTIONS} must be a positive integer"))?,
        Err(_) => DEFAULT_MAX_CONNECTIONS,
    };
    connect(&url, max_connections).await
}

/// Apply the embedded customer/purchase/referral schema.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    MIGRATOR.run(pool).await.context("shop schema migration failed")?;
    Ok(())
}

/// What an operator needs to know before pointing the daemon at a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbStatus {
    /// Shop tables absent from the `public` schema.
    pub missing_tables: Vec<String>,
    /// Purchase counts keyed by status.
    pub purchases_by_status: BTreeMap<String, i64>,
    /// Open purchases whose activation lease is held. A lease that stays
    /// held points at an activation that crashed mid-flight.
    pub held_activation_leases: i64,
    /// Referrals whose bonus lease is held without the bonus being granted.
    pub held_bonus_leases: i64,
}

impl DbStatus {
    pub fn schema_ready(&self) -> bool {
        self.missing_tables.is_empty()
    }
}

/// Schema presence plus the lifecycle counters of the payment ledger.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let names: Vec<String> = SHOP_TABLES.iter().map(|t| t.to_string()).collect();
    let present: Vec<(String,)> = sqlx::query_as::<_, (String,)>(
        r#"
        select table_name::text
        from information_schema.tables
        where table_schema = 'public'
          and table_name = any($1)
        "#,
    )
    .bind(&names)
    .fetch_all(pool)
    .await
    .context("status table query failed")?;

    let mut st = DbStatus {
        missing_tables: SHOP_TABLES
            .iter()
            .filter(|t| !present.iter().any(|(p,)| p == *t))
            .map(|t| t.to_string())
            .collect(),
        ..DbStatus::default()
    };
    if !st.schema_ready() {
        return Ok(st);
    }

    let counts: Vec<(String, i64)> = sqlx::query_as::<_, (String, i64)>(
        "select status, count(*)::bigint from purchase group by status",
    )
    .fetch_all(pool)
    .await
    .context("status purchase count failed")?;
    st.purchases_by_status = counts.into_iter().collect();

    let (held_activation_leases, held_bonus_leases): (i64, i64) =
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            select
              (select count(*)::bigint from purchase
                where activation_claimed_at is not null and status in ('new', 'pending')),
              (select count(*)::bigint from referral
                where bonus_claimed_at is not null and not bonus_granted)
            "#,
        )
        .fetch_one(pool)
        .await
        .context("status lease count failed")?;
    st.held_activation_leases = held_activation_leases;
    st.held_bonus_leases = held_bonus_leases;

    Ok(st)
}

/// Insert a customer row; used by operator tooling and DB scenarios.
pub async fn insert_customer(pool: &PgPool, telegram_id: i64, language: &str) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into customer (telegram_id, language)
        values ($1, $2)
        returning id
        "#,
    )
    .bind(telegram_id)
    .bind(language)
    .fetch_one(pool)
    .await
    .context("insert_customer failed")?;

    Ok(id)
}

/// Record a referral edge; referrals are normally created by the bot layer.
pub async fn insert_referral(pool: &PgPool, referrer_id: i64, referee_id: i64) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into referral (referrer_id, referee_id)
        values ($1, $2)
        returning id
        "#,
    )
    .bind(referrer_id)
    .bind(referee_id)
    .fetch_one(pool)
    .await
    .context("insert_referral failed")?;

    Ok(id)
}
