use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_schemas::{
    Correlation, Customer, InvoiceType, NewPurchase, Purchase, PurchaseStatus, Referral,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::store::{CustomerStore, PurchaseStore, ReferralStore};

/// Postgres-backed implementation of every store contract.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Correlation (id, url) columns owned by each invoice type.
pub fn correlation_columns(invoice_type: InvoiceType) -> (&'static str, &'static str) {
    match invoice_type {
        InvoiceType::Crypto => ("crypto_invoice_id", "crypto_invoice_url"),
        InvoiceType::Yookasa => ("yookasa_id", "yookasa_url"),
        InvoiceType::Telegram => ("telegram_payload", "telegram_invoice_url"),
        InvoiceType::Rapyd => ("rapyd_checkout_id", "rapyd_url"),
    }
}

const PURCHASE_COLUMNS: &str = r#"
    id, customer_id, invoice_type, status, amount, currency, month,
    crypto_invoice_id, crypto_invoice_url,
    yookasa_id, yookasa_url,
    telegram_payload, telegram_invoice_url,
    rapyd_checkout_id, rapyd_url,
    created_at, paid_at
"#;

fn purchase_from_row(row: &PgRow) -> Result<Purchase> {
    let invoice_type = InvoiceType::parse(&row.try_get::<String, _>("invoice_type")?)?;
    let status = PurchaseStatus::parse(&row.try_get::<String, _>("status")?)?;

    let (id_col, url_col) = correlation_columns(invoice_type);
    let external_id: Option<String> = row.try_get(id_col)?;
    let external_url: Option<String> = row.try_get(url_col)?;
    let correlation = external_id.map(|external_id| Correlation {
        external_id,
        external_url: external_url.unwrap_or_default(),
    });

    Ok(Purchase {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        invoice_type,
        status,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        months: row.try_get("month")?,
        correlation,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer> {
    Ok(Customer {
        id: row.try_get("id")?,
        telegram_id: row.try_get("telegram_id")?,
        language: row.try_get("language")?,
        subscription_link: row.try_get("subscription_link")?,
        expire_at: row.try_get("expire_at")?,
    })
}

// ---------------------------------------------------------------------------
// Purchases
// ---------------------------------------------------------------------------

#[async_trait]
impl PurchaseStore for PgStore {
    async fn insert_purchase(&self, new: &NewPurchase) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
            r#"
            insert into purchase (customer_id, invoice_type, status, amount, currency, month)
            values ($1, $2, 'new', $3, $4, $5)
            returning id
            "#,
        )
        .bind(new.customer_id)
        .bind(new.invoice_type.as_str())
        .bind(new.amount)
        .bind(&new.currency)
        .bind(new.months)
        .fetch_one(&self.pool)
        .await
        .context("insert_purchase failed")?;

        Ok(id)
    }

    async fn find_purchase(&self, id: i64) -> Result<Option<Purchase>> {
        let sql = format!("select {PURCHASE_COLUMNS} from purchase where id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find_purchase failed")?;

        row.as_ref().map(purchase_from_row).transpose()
    }

    async fn set_correlation_pending(
        &self,
        id: i64,
        invoice_type: InvoiceType,
        correlation: &Correlation,
    ) -> Result<bool> {
        let (id_col, url_col) = correlation_columns(invoice_type);
        let sql = format!(
            r#"
            update purchase
            set {id_col} = $2,
                {url_col} = $3,
                status = 'pending'
            where id = $1
              and invoice_type = $4
              and status = 'new'
            "#
        );

        let res = sqlx::query(&sql)
            .bind(id)
            .bind(&correlation.external_id)
            .bind(&correlation.external_url)
            .bind(invoice_type.as_str())
            .execute(&self.pool)
            .await
            .context("set_correlation_pending failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn claim_activation(
        &self,
        id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update purchase
            set activation_claimed_at = $2
            where id = $1
              and status in ('new', 'pending')
              and (activation_claimed_at is null or activation_claimed_at < $3)
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .context("claim_activation failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn release_activation(&self, id: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update purchase
            set activation_claimed_at = null
            where id = $1
              and status in ('new', 'pending')
              and activation_claimed_at is not null
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("release_activation failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn mark_paid(&self, id: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update purchase
            set status = 'paid',
                paid_at = now(),
                activation_claimed_at = null
            where id = $1
              and status in ('new', 'pending')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("mark_paid failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn cancel_purchase(&self, id: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update purchase
            set status = 'cancel'
            where id = $1
              and status in ('new', 'pending')
              and activation_claimed_at is null
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("cancel_purchase failed")?;

        Ok(res.rows_affected() == 1)
    }
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

#[async_trait]
impl CustomerStore for PgStore {
    async fn find_customer(&self, id: i64) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            select id, telegram_id, language, subscription_link, expire_at
            from customer
            where id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find_customer failed")?;

        row.as_ref().map(customer_from_row).transpose()
    }

    async fn find_customer_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            select id, telegram_id, language, subscription_link, expire_at
            from customer
            where telegram_id = $1
            "#,
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await
        .context("find_customer_by_telegram_id failed")?;

        row.as_ref().map(customer_from_row).transpose()
    }

    async fn update_entitlement(
        &self,
        customer_id: i64,
        subscription_link: &str,
        expire_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            update customer
            set subscription_link = $2,
                expire_at = $3
            where id = $1
            "#,
        )
        .bind(customer_id)
        .bind(subscription_link)
        .bind(expire_at)
        .execute(&self.pool)
        .await
        .context("update_entitlement failed")?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Referrals
// ---------------------------------------------------------------------------

#[async_trait]
impl ReferralStore for PgStore {
    async fn find_referral_by_referee(&self, referee_id: i64) -> Result<Option<Referral>> {
        let row = sqlx::query(
            r#"
            select id, referrer_id, referee_id, bonus_granted, created_at
            from referral
            where referee_id = $1
            "#,
        )
        .bind(referee_id)
        .fetch_optional(&self.pool)
        .await
        .context("find_referral_by_referee failed")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Referral {
            id: row.try_get("id")?,
            referrer_id: row.try_get("referrer_id")?,
            referee_id: row.try_get("referee_id")?,
            bonus_granted: row.try_get("bonus_granted")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn claim_bonus(
        &self,
        referral_id: i64,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update referral
            set bonus_claimed_at = $2
            where id = $1
              and bonus_granted = false
              and (bonus_claimed_at is null or bonus_claimed_at < $3)
            "#,
        )
        .bind(referral_id)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .context("claim_bonus failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn release_bonus(&self, referral_id: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update referral
            set bonus_claimed_at = null
            where id = $1
              and bonus_granted = false
              and bonus_claimed_at is not null
            "#,
        )
        .bind(referral_id)
        .execute(&self.pool)
        .await
        .context("release_bonus failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn mark_bonus_granted(&self, referral_id: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update referral
            set bonus_granted = true,
                bonus_claimed_at = null
            where id = $1
              and bonus_granted = false
            "#,
        )
        .bind(referral_id)
        .execute(&self.pool)
        .await
        .context("mark_bonus_granted failed")?;

        Ok(res.rows_affected() == 1)
    }
}
