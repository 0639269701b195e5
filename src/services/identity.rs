//! Identity resolution: anonymous visitors keyed by IP, authenticated users
//! keyed by social id or email, and the merge that welds the two together.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{AppError, AppResult, RepositoryError};
use crate::models::{IdentityClaim, User};
use crate::repositories::UserRepository;
use crate::services::profile;

pub struct IdentityService {
    users: Arc<UserRepository>,
    billing: BillingConfig,
}

impl IdentityService {
    pub fn new(users: Arc<UserRepository>, billing: BillingConfig) -> Self {
        Self { users, billing }
    }

    /// The anonymous user owning `ip`, created on first sight with a
    /// deterministic profile and the signup token grant.
    pub async fn find_or_create_by_ip(&self, ip: &str) -> AppResult<User> {
        if ip.is_empty() {
            return Err(AppError::Validation("Client IP is required".to_string()));
        }

        if let Some(user) = self.users.find_by_ip(ip).await? {
            return Ok(user);
        }

        let username = profile::username_for_seed(ip);
        let avatar_id = profile::avatar_id_for_seed(ip);

        match self
            .users
            .create(
                Some(ip),
                Some(&username),
                Some(avatar_id),
                self.billing.signup_balance,
            )
            .await
        {
            Ok(user) => {
                info!(user_id = %user.id, %ip, "Created anonymous user");
                Ok(user)
            }
            // Lost a creation race for the same IP; the winner's row is ours.
            Err(RepositoryError::Duplicate(_)) => {
                let user = self
                    .users
                    .find_by_ip(ip)
                    .await?
                    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
                Ok(user)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve an authenticated login to exactly one user row.
    ///
    /// Lookup order is social id, then email, then the anonymous row for the
    /// caller's IP. When the claim matches one row and the IP another, the
    /// two are merged with the identified row surviving, so the anonymous
    /// balance and history carry over without double-counting. A login with
    /// no usable hint at all is rejected.
    pub async fn resolve_and_link(
        &self,
        claim: &IdentityClaim,
        ip: Option<&str>,
    ) -> AppResult<User> {
        if claim.is_empty() && ip.map_or(true, str::is_empty) {
            return Err(AppError::Validation(
                "No identity hints: need a social id, email or client IP".to_string(),
            ));
        }

        let claimed = self.find_by_claim(claim).await?;

        let by_ip = match ip.filter(|s| !s.is_empty()) {
            Some(ip) => self.users.find_by_ip(ip).await?,
            None => None,
        };

        let user = match (claimed, by_ip) {
            // Only an unauthenticated IP row gets folded in; an authorized
            // row on the same IP is somebody else's account.
            (Some(identified), Some(anon)) if identified.id != anon.id && !anon.is_authorized => {
                info!(
                    survivor = %identified.id,
                    merged = %anon.id,
                    "Merging anonymous user into identified account"
                );
                match self.users.merge_into(identified.id, anon.id).await {
                    Ok(user) => user,
                    // The anon row disappeared under us (a concurrent login
                    // already merged it). The identified row is still right.
                    Err(RepositoryError::NotFound(_)) => {
                        warn!(survivor = %identified.id, "Merge lost a race, keeping survivor");
                        self.users
                            .find_by_id(identified.id)
                            .await?
                            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            (Some(identified), _) => identified,
            // Adopting the IP row is only safe while it is still anonymous;
            // an authorized row there belongs to a different login.
            (None, Some(anon)) if !anon.is_authorized => anon,
            (None, _) => {
                let seed = claim
                    .display_name
                    .clone()
                    .or_else(|| ip.map(str::to_string))
                    .or_else(|| claim.email.clone())
                    .or_else(|| claim.social_id.clone())
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let username = profile::username_for_seed(&seed);
                let avatar_id = profile::avatar_id_for_seed(&seed);
                self.users
                    .create(ip, Some(&username), Some(avatar_id), self.billing.signup_balance)
                    .await?
            }
        };

        if claim.is_empty() {
            return Ok(user);
        }

        let user = self.users.apply_identity(user.id, claim, ip, true).await?;
        Ok(user)
    }

    /// Attach an email to a user. Emails are normalized (trim + lowercase)
    /// before any check. Re-submitting the email the user already has is
    /// idempotent; a different email, or one owned by another user, is a
    /// conflict.
    pub async fn attach_email(
        &self,
        user_id: Uuid,
        email: &str,
        promo_opt_in: Option<bool>,
    ) -> AppResult<User> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }

        if let Some(owner) = self.users.find_by_email(&email).await? {
            if owner.id == user_id {
                return Ok(owner);
            }
            return Err(AppError::Conflict(
                "Email is already attached to another user".to_string(),
            ));
        }

        let user = self.users.set_email(user_id, &email, promo_opt_in).await?;
        Ok(user)
    }

    pub async fn record_consent(&self, user_id: Uuid, consent: bool) -> AppResult<()> {
        self.users.set_consent(user_id, consent).await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn find_by_claim(&self, claim: &IdentityClaim) -> AppResult<Option<User>> {
        if let Some(social_id) = claim.social_id.as_deref() {
            if let Some(user) = self.users.find_by_social_id(social_id).await? {
                return Ok(Some(user));
            }
        }
        if let Some(email) = claim.email.as_deref() {
            if let Some(user) = self.users.find_by_email(email).await? {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}
