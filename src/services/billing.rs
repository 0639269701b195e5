//! Billing orchestration over the ledger: one-time bonuses, payment intents
//! and webhook settlement.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{AppError, AppResult};
use crate::models::{BonusKind, Tokens, Transaction};
use crate::repositories::{LedgerRepository, PaymentEvent};
use crate::services::tariffs;

pub struct BillingService {
    ledger: Arc<LedgerRepository>,
    config: BillingConfig,
}

impl BillingService {
    pub fn new(ledger: Arc<LedgerRepository>, config: BillingConfig) -> Self {
        Self { ledger, config }
    }

    pub async fn balance(&self, user_id: Uuid) -> AppResult<Tokens> {
        Ok(self.ledger.get_balance(user_id).await?)
    }

    /// Credit the review bonus if this user has never received it. Returns
    /// whether the grant happened on this call.
    pub async fn grant_review_bonus(&self, user_id: Uuid) -> AppResult<bool> {
        let granted = self
            .ledger
            .grant_bonus_once(user_id, BonusKind::Review, self.config.review_bonus)
            .await?;
        if granted {
            info!(%user_id, "Granted review bonus");
        }
        Ok(granted)
    }

    /// Credit the channel-subscription bonus if never received.
    pub async fn grant_subscription_bonus(&self, user_id: Uuid) -> AppResult<bool> {
        let granted = self
            .ledger
            .grant_bonus_once(
                user_id,
                BonusKind::ChannelSubscription,
                self.config.subscription_bonus,
            )
            .await?;
        if granted {
            info!(%user_id, "Granted channel subscription bonus");
        }
        Ok(granted)
    }

    /// Record a pending purchase of a catalog tariff. No tokens move until
    /// the gateway webhook confirms the reference.
    pub async fn create_payment_intent(
        &self,
        user_id: Uuid,
        tariff_id: &str,
        provider: &str,
        reference: &str,
    ) -> AppResult<Transaction> {
        if reference.is_empty() {
            return Err(AppError::Validation(
                "Payment reference is required".to_string(),
            ));
        }

        let tariff = tariffs::get_tariff(tariff_id)?;

        let txn = self
            .ledger
            .record_intent(
                user_id,
                provider,
                tariff.price_minor,
                tariff.currency,
                tariff.id,
                reference,
                Some(json!({ "tokens": tariff.tokens })),
            )
            .await?;

        info!(%user_id, tariff = tariff.id, %reference, "Recorded payment intent");
        Ok(txn)
    }

    /// Settle a confirmed gateway payment. Safe to call any number of times
    /// for the same reference; the tokens are credited once.
    pub async fn apply_gateway_payment(&self, event: &PaymentEvent) -> AppResult<bool> {
        let applied = self.ledger.apply_gateway_payment(event).await?;
        if applied {
            info!(
                user_id = %event.user_id,
                reference = %event.reference,
                tokens = %event.tokens,
                "Applied gateway payment"
            );
        } else {
            info!(
                reference = %event.reference,
                "Duplicate gateway payment delivery ignored"
            );
        }
        Ok(applied)
    }

    pub async fn history(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Transaction>> {
        Ok(self.ledger.user_transactions(user_id, limit).await?)
    }
}
