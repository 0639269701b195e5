//! Repository for user identity data access.

use crate::error::RepositoryError;
use crate::models::{IdentityClaim, Tokens, User};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, ip, username, avatar_id, avatar_url, anon_user_id, email, social_id, \
     balance_tokens, tokens_used_as_anon, is_authorized, consent_pd, is_accepted_promo, \
     review_bonus_granted, is_joined_in_channel, created_at, updated_at";

pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new UserRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new user. Fresh users carry a generated anonymous billing id
    /// and start unauthenticated.
    pub async fn create(
        &self,
        ip: Option<&str>,
        username: Option<&str>,
        avatar_id: Option<i64>,
        starting_balance: Tokens,
    ) -> Result<User, RepositoryError> {
        if starting_balance.is_negative() {
            return Err(RepositoryError::InvalidInput(
                "Starting balance must not be negative".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, ip, username, avatar_id, anon_user_id, balance_tokens,
                               tokens_used_as_anon, is_authorized, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?7)
            "#,
        )
        .bind(id)
        .bind(ip)
        .bind(username)
        .bind(avatar_id)
        .bind(Uuid::new_v4().to_string())
        .bind(starting_balance)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("User vanished after insert".to_string()))
    }

    /// Find a user by UUID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    /// Find the anonymous owner of an IP. At most one user is treated as
    /// owning an IP at a time; the earliest created wins.
    pub async fn find_by_ip(&self, ip: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE ip = ?1 ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_social_id(
        &self,
        social_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE social_id = ?1"
        ))
        .bind(social_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Apply newly learned identity fields onto a user. `None` fields are
    /// left untouched; a duplicate email/social id surfaces as `Duplicate`.
    pub async fn apply_identity(
        &self,
        user_id: Uuid,
        claim: &IdentityClaim,
        ip: Option<&str>,
        authorize: bool,
    ) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET social_id = COALESCE(?2, social_id),
                email = COALESCE(?3, email),
                username = COALESCE(?4, username),
                ip = COALESCE(?5, ip),
                is_authorized = is_authorized OR ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(user_id)
        .bind(claim.social_id.as_deref())
        .bind(claim.email.as_deref())
        .bind(claim.display_name.as_deref())
        .bind(ip)
        .bind(authorize)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("User not found".to_string()));
        }

        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))
    }

    /// Attach an email to a user that does not have one yet. Optionally
    /// records the promo-mailing opt-in supplied alongside.
    pub async fn set_email(
        &self,
        user_id: Uuid,
        email: &str,
        promo_opt_in: Option<bool>,
    ) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = ?2,
                is_accepted_promo = COALESCE(?3, is_accepted_promo),
                updated_at = ?4
            WHERE id = ?1 AND email IS NULL
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(promo_opt_in)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(
                "User already has an email".to_string(),
            ));
        }

        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))
    }

    /// Record personal-data consent.
    pub async fn set_consent(&self, user_id: Uuid, consent: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET consent_pd = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(user_id)
            .bind(consent)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("User not found".to_string()));
        }

        Ok(())
    }

    /// Merge the anonymous `loser` into the identified `survivor`.
    ///
    /// Balances are summed, the anonymous-usage counter takes the max (never
    /// double-counted), username/avatar/IP are taken from the anonymous side
    /// when present, every owned Job and Transaction is repointed, and the
    /// loser row is deleted. All of it happens in one transaction whose first
    /// statement is the combining UPDATE: that takes the write lock for the
    /// whole merge, so a racing debit against the loser serializes before or
    /// after the merge, never inside it.
    pub async fn merge_into(
        &self,
        survivor_id: Uuid,
        loser_id: Uuid,
    ) -> Result<User, RepositoryError> {
        if survivor_id == loser_id {
            return Err(RepositoryError::InvalidInput(
                "Cannot merge a user into itself".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE users
            SET balance_tokens = balance_tokens
                    + (SELECT balance_tokens FROM users WHERE id = ?2),
                tokens_used_as_anon = max(tokens_used_as_anon,
                    (SELECT tokens_used_as_anon FROM users WHERE id = ?2)),
                username = COALESCE((SELECT username FROM users WHERE id = ?2), username),
                avatar_id = COALESCE((SELECT avatar_id FROM users WHERE id = ?2), avatar_id),
                ip = COALESCE((SELECT ip FROM users WHERE id = ?2), ip),
                updated_at = ?3
            WHERE id = ?1
              AND EXISTS (SELECT 1 FROM users WHERE id = ?2)
            "#,
        )
        .bind(survivor_id)
        .bind(loser_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(
                "Merge participant not found".to_string(),
            ));
        }

        sqlx::query("UPDATE jobs SET user_id = ?1, updated_at = ?3 WHERE user_id = ?2")
            .bind(survivor_id)
            .bind(loser_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE transactions SET user_id = ?1 WHERE user_id = ?2")
            .bind(survivor_id)
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(loser_id)
            .execute(&mut *tx)
            .await?;

        let survivor =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
                .bind(survivor_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(survivor)
    }
}
