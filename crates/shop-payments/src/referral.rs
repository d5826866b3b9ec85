//! Referral credit engine.
//!
//! The `bonus_granted` flag is the source of truth and is set only after the
//! referrer's extension is persisted. A bonus lease keeps concurrent credits
//! out meanwhile; a failed extension releases it so the credit can be retried.

use chrono::Utc;
use shop_schemas::mask_half;

use crate::keyboard::connect_keyboard;
use crate::service::PaymentService;
use crate::PaymentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// The referee was not referred by anyone.
    NoReferral,
    /// The bonus was granted earlier (or by a concurrent caller).
    AlreadyGranted,
    Granted { referrer_telegram_id: i64 },
    /// Another caller holds the bonus lease right now.
    InProgress,
}

impl PaymentService {
    /// Credit the referrer of `referee_telegram_id`, at most once per referral.
    ///
    /// On failure the referral stays ungranted and the lease is released, so a
    /// later call credits it.
    pub async fn credit_referral(
        &self,
        referee_telegram_id: i64,
    ) -> Result<ReferralOutcome, PaymentError> {
        let Some(referral) = self
            .deps
            .referrals
            .find_referral_by_referee(referee_telegram_id)
            .await?
        else {
            return Ok(ReferralOutcome::NoReferral);
        };
        if referral.bonus_granted {
            return Ok(ReferralOutcome::AlreadyGranted);
        }

        let referrer = self
            .deps
            .customers
            .find_customer_by_telegram_id(referral.referrer_id)
            .await?
            .ok_or(PaymentError::NotFound {
                entity: "referrer",
                id: referral.referrer_id,
            })?;

        let lease = self.lease()?;
        let now = Utc::now();
        if !self
            .deps
            .referrals
            .claim_bonus(referral.id, now, now - lease)
            .await?
        {
            let granted = self
                .deps
                .referrals
                .find_referral_by_referee(referee_telegram_id)
                .await?
                .is_some_and(|r| r.bonus_granted);
            tracing::info!(
                referrer = %mask_half(referral.referrer_id),
                referee = %mask_half(referee_telegram_id),
                granted,
                "referral bonus claimed elsewhere"
            );
            return Ok(if granted {
                ReferralOutcome::AlreadyGranted
            } else {
                ReferralOutcome::InProgress
            });
        }

        let ent = match self
            .deps
            .entitlements
            .create_or_update_user(
                referrer.id,
                referrer.telegram_id,
                self.settings.traffic_limit_bytes,
                self.settings.referral_days,
            )
            .await
        {
            Ok(ent) => ent,
            Err(e) => {
                tracing::error!(
                    referrer = %mask_half(referrer.telegram_id),
                    error = %e,
                    "referral extension failed; bonus left ungranted"
                );
                if let Err(release) = self.deps.referrals.release_bonus(referral.id).await {
                    tracing::warn!(error = %release, "bonus lease not released");
                }
                return Err(e.into());
            }
        };

        self.deps
            .customers
            .update_entitlement(referrer.id, &ent.subscription_url, ent.expire_at)
            .await?;

        if !self.deps.referrals.mark_bonus_granted(referral.id).await? {
            tracing::warn!(
                referrer = %mask_half(referral.referrer_id),
                "bonus granted by a stale-lease takeover"
            );
            return Ok(ReferralOutcome::AlreadyGranted);
        }

        let texts = self.settings.texts_for(&referrer.language);
        let keyboard = connect_keyboard(&texts, self.settings.mini_app_url.as_deref());
        if let Err(e) = self
            .deps
            .notifier
            .send_message(referrer.telegram_id, &texts.referral_bonus_granted, Some(&keyboard))
            .await
        {
            tracing::warn!(referrer = %mask_half(referrer.telegram_id), error = %e, "referral notification failed");
        }

        tracing::info!(
            referrer = %mask_half(referrer.telegram_id),
            referee = %mask_half(referee_telegram_id),
            days = self.settings.referral_days,
            "referral bonus granted"
        );
        Ok(ReferralOutcome::Granted {
            referrer_telegram_id: referrer.telegram_id,
        })
    }
}
