//! Activation orchestrator: turns a confirmed payment into an entitlement.

use chrono::{DateTime, Utc};
use shop_schemas::mask_half;

use crate::keyboard::connect_keyboard;
use crate::ledger::ActivationClaim;
use crate::referral::ReferralOutcome;
use crate::service::PaymentService;
use crate::PaymentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub subscription_url: String,
    pub expire_at: DateTime<Utc>,
    pub referral: ReferralOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Another confirmation got there first; nothing was called.
    AlreadyPaid,
    Activated(Activation),
}

impl PaymentService {
    /// Provision the entitlement of `purchase_id`, then mark it `Paid` and
    /// credit any referral.
    ///
    /// The activation lease keeps a concurrent or replayed confirmation out
    /// while this one runs. If the entitlement call fails the lease is
    /// released and the purchase stays open, so the next confirmation or
    /// poll retries it.
    pub async fn activate(&self, purchase_id: i64) -> Result<ActivationOutcome, PaymentError> {
        let purchase = self.deps.ledger.load(purchase_id).await?;
        let customer = self.load_customer(purchase.customer_id).await?;

        let lease = self.lease()?;
        if self.deps.ledger.claim_activation(purchase_id, lease).await?
            == ActivationClaim::AlreadyPaid
        {
            tracing::info!(purchase_id = %mask_half(purchase_id), "purchase already paid");
            return Ok(ActivationOutcome::AlreadyPaid);
        }

        if let Some(message_id) = self.deps.prompts.take(purchase_id) {
            if let Err(e) = self
                .deps
                .notifier
                .delete_message(customer.telegram_id, message_id)
                .await
            {
                tracing::warn!(purchase_id = %mask_half(purchase_id), error = %e, "prompt delete failed");
            }
        }

        let days = purchase.entitlement_days();
        let ent = match self
            .deps
            .entitlements
            .create_or_update_user(
                customer.id,
                customer.telegram_id,
                self.settings.traffic_limit_bytes,
                days,
            )
            .await
        {
            Ok(ent) => ent,
            Err(e) => {
                tracing::error!(
                    purchase_id = %mask_half(purchase_id),
                    customer_id = %mask_half(customer.id),
                    error = %e,
                    "entitlement failed; purchase left open for retry"
                );
                if let Err(release) = self.deps.ledger.release_activation(purchase_id).await {
                    tracing::warn!(
                        purchase_id = %mask_half(purchase_id),
                        error = %release,
                        "activation lease not released; retry waits for it to go stale"
                    );
                }
                return Err(e.into());
            }
        };

        // On failure the lease stays held; a retry after it goes stale
        // re-runs the (idempotent) panel update.
        if let Err(e) = self
            .deps
            .customers
            .update_entitlement(customer.id, &ent.subscription_url, ent.expire_at)
            .await
        {
            tracing::error!(
                purchase_id = %mask_half(purchase_id),
                customer_id = %mask_half(customer.id),
                error = %e,
                "entitlement granted but not persisted"
            );
            return Err(e.into());
        }

        if !self.deps.ledger.commit_paid(purchase_id).await? {
            tracing::warn!(purchase_id = %mask_half(purchase_id), "paid committed by a stale-lease takeover");
            return Ok(ActivationOutcome::AlreadyPaid);
        }

        let texts = self.settings.texts_for(&customer.language);
        let keyboard = connect_keyboard(&texts, self.settings.mini_app_url.as_deref());
        if let Err(e) = self
            .deps
            .notifier
            .send_message(customer.telegram_id, &texts.subscription_activated, Some(&keyboard))
            .await
        {
            tracing::warn!(purchase_id = %mask_half(purchase_id), error = %e, "activation notification failed");
        }

        tracing::info!(
            purchase_id = %mask_half(purchase_id),
            customer_id = %mask_half(customer.id),
            invoice_type = %purchase.invoice_type,
            days,
            "subscription activated"
        );

        // Paid and the entitlement stay committed if this fails; the referral
        // stays ungranted for `credit_referral` to pick up later.
        let referral = self.credit_referral(customer.telegram_id).await?;

        Ok(ActivationOutcome::Activated(Activation {
            subscription_url: ent.subscription_url,
            expire_at: ent.expire_at,
            referral,
        }))
    }
}
