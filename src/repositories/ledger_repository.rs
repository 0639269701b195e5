//! The token ledger: balance arithmetic plus the append-only transaction log.
//!
//! Every balance mutation is a single conditional UPDATE, never a
//! read-modify-write pair, and commits together with its Transaction row in
//! one unit of work. This repository is the only sanctioned mutation path
//! for balance fields.

use crate::error::RepositoryError;
use crate::models::{BonusKind, Tokens, Transaction, TransactionStatus, TransactionType, User};
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction as SqlxTransaction};
use uuid::Uuid;

const TXN_COLUMNS: &str = "id, user_id, job_id, type, provider, status, amount_minor, \
     tokens_delta, currency, plan, reference, meta, created_at";

const USER_COLUMNS: &str = "id, ip, username, avatar_id, avatar_url, anon_user_id, email, social_id, \
     balance_tokens, tokens_used_as_anon, is_authorized, consent_pd, is_accepted_promo, \
     review_bonus_granted, is_joined_in_channel, created_at, updated_at";

/// A confirmed payment asserted by the gateway webhook. `reference` is the
/// idempotency key: the same reference credits at most once.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub user_id: Uuid,
    pub provider: String,
    pub reference: String,
    pub amount_minor: Option<i64>,
    pub currency: String,
    pub tokens: Tokens,
    pub meta: Option<serde_json::Value>,
}

pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<Tokens, RepositoryError> {
        let balance: Option<Tokens> =
            sqlx::query_scalar("SELECT balance_tokens FROM users WHERE id = ?1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        balance.ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))
    }

    /// Atomically debit `amount` tokens from a user.
    ///
    /// The balance guard lives in the UPDATE itself (`balance_tokens >= ?`),
    /// so two racing debits of a one-token balance let exactly one through.
    /// Unauthenticated users additionally have their anonymous-usage counter
    /// bumped. Appends a `charge` Transaction in the same unit of work.
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: Tokens,
        job_id: Option<Uuid>,
    ) -> Result<User, RepositoryError> {
        if amount <= Tokens::ZERO {
            return Err(RepositoryError::InvalidInput(
                "Debit amount must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE users
            SET balance_tokens = balance_tokens - ?2,
                tokens_used_as_anon = tokens_used_as_anon
                    + (CASE WHEN is_authorized THEN 0 ELSE 1 END),
                updated_at = ?3
            WHERE id = ?1 AND balance_tokens >= ?2
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = ?1)")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await?;
            return if exists {
                Err(RepositoryError::InsufficientFunds(format!(
                    "Balance below {} tokens",
                    amount
                )))
            } else {
                Err(RepositoryError::NotFound("User not found".to_string()))
            };
        }

        Self::append_transaction(
            &mut tx,
            user_id,
            job_id,
            TransactionType::Charge,
            None,
            TransactionStatus::Success,
            None,
            Some(-amount),
            None,
            None,
            None,
        )
        .await?;

        let user = Self::fetch_user(&mut tx, user_id).await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Atomically credit `amount` tokens to a user; always succeeds for an
    /// existing user. Appends a Transaction of the given type.
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Tokens,
        tx_type: TransactionType,
        provider: Option<&str>,
        reference: Option<&str>,
        meta: Option<serde_json::Value>,
    ) -> Result<User, RepositoryError> {
        if amount <= Tokens::ZERO {
            return Err(RepositoryError::InvalidInput(
                "Credit amount must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE users SET balance_tokens = balance_tokens + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(user_id)
        .bind(amount)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("User not found".to_string()));
        }

        Self::append_transaction(
            &mut tx,
            user_id,
            None,
            tx_type,
            provider,
            TransactionStatus::Success,
            None,
            Some(amount),
            None,
            reference,
            meta,
        )
        .await?;

        let user = Self::fetch_user(&mut tx, user_id).await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Grant a one-time bonus. The "already granted" flag flip and the credit
    /// are one conditional UPDATE, so concurrent duplicate calls produce
    /// exactly one grant. Returns whether this call performed it; a `promo`
    /// Transaction is appended only in that case.
    pub async fn grant_bonus_once(
        &self,
        user_id: Uuid,
        kind: BonusKind,
        amount: Tokens,
    ) -> Result<bool, RepositoryError> {
        if amount <= Tokens::ZERO {
            return Err(RepositoryError::InvalidInput(
                "Bonus amount must be positive".to_string(),
            ));
        }

        let flag = kind.flag_column();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            "UPDATE users SET {flag} = 1, balance_tokens = balance_tokens + ?2, updated_at = ?3 \
             WHERE id = ?1 AND {flag} = 0"
        ))
        .bind(user_id)
        .bind(amount)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = ?1)")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !exists {
                return Err(RepositoryError::NotFound("User not found".to_string()));
            }
            // Already granted earlier; nothing to append.
            return Ok(false);
        }

        Self::append_transaction(
            &mut tx,
            user_id,
            None,
            TransactionType::Promo,
            None,
            TransactionStatus::Success,
            None,
            Some(amount),
            Some(kind.as_str()),
            Some(&format!("bonus:{}:{}", kind.as_str(), user_id)),
            None,
        )
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    /// Apply a confirmed gateway payment, crediting the token amount exactly
    /// once per reference. Duplicate webhook delivery is a no-op; returns
    /// whether this call applied the credit.
    pub async fn apply_gateway_payment(
        &self,
        event: &PaymentEvent,
    ) -> Result<bool, RepositoryError> {
        if event.tokens <= Tokens::ZERO {
            return Err(RepositoryError::InvalidInput(
                "Payment token amount must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        // Checked up front: an unknown user would otherwise surface as the
        // insert's foreign-key violation instead of NotFound.
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = ?1)")
            .bind(event.user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(RepositoryError::NotFound("User not found".to_string()));
        }

        // The partial unique index over successful gateway payments turns the
        // second delivery of a reference into an ignored insert.
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transactions
                (id, user_id, job_id, type, provider, status, amount_minor, tokens_delta,
                 currency, reference, meta, created_at)
            VALUES (?1, ?2, NULL, 'gateway_payment', ?3, 'success', ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id)
        .bind(&event.provider)
        .bind(event.amount_minor)
        .bind(event.tokens)
        .bind(&event.currency)
        .bind(&event.reference)
        .bind(event.meta.as_ref().map(|m| m.to_string()))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        let credited = sqlx::query(
            "UPDATE users SET balance_tokens = balance_tokens + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(event.user_id)
        .bind(event.tokens)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if credited.rows_affected() == 0 {
            // Rolls the insert back too.
            return Err(RepositoryError::NotFound("User not found".to_string()));
        }

        tx.commit().await?;

        Ok(true)
    }

    /// Record a pending payment intent (no balance effect until the webhook
    /// confirms it).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_intent(
        &self,
        user_id: Uuid,
        provider: &str,
        amount_minor: i64,
        currency: &str,
        plan: &str,
        reference: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<Transaction, RepositoryError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, user_id, type, provider, status, amount_minor, currency, plan, reference,
                 meta, created_at)
            VALUES (?1, ?2, 'gateway_payment', ?3, 'pending', ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(provider)
        .bind(amount_minor)
        .bind(currency)
        .bind(plan)
        .bind(reference)
        .bind(meta.as_ref().map(|m| m.to_string()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let txn = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(txn)
    }

    /// Transaction history for a user, newest first.
    pub async fn user_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TXN_COLUMNS} FROM transactions \
             WHERE user_id = ?1 ORDER BY created_at DESC, id LIMIT ?2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// All rows recorded under an idempotency reference.
    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TXN_COLUMNS} FROM transactions WHERE reference = ?1 ORDER BY created_at"
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_transaction(
        tx: &mut SqlxTransaction<'_, Sqlite>,
        user_id: Uuid,
        job_id: Option<Uuid>,
        tx_type: TransactionType,
        provider: Option<&str>,
        status: TransactionStatus,
        amount_minor: Option<i64>,
        tokens_delta: Option<Tokens>,
        plan: Option<&str>,
        reference: Option<&str>,
        meta: Option<serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, user_id, job_id, type, provider, status, amount_minor, tokens_delta,
                 plan, reference, meta, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(job_id)
        .bind(tx_type)
        .bind(provider)
        .bind(status)
        .bind(amount_minor)
        .bind(tokens_delta)
        .bind(plan)
        .bind(reference)
        .bind(meta.as_ref().map(|m| m.to_string()))
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn fetch_user(
        tx: &mut SqlxTransaction<'_, Sqlite>,
        user_id: Uuid,
    ) -> Result<User, RepositoryError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?;

        Ok(user)
    }
}
