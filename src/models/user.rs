use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::Tokens;

/// User account: identity hints (IP, social id, email) plus the token wallet.
///
/// Balance fields are only ever mutated through `LedgerRepository`; the
/// identity fields through `UserRepository`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub ip: Option<String>,
    pub username: Option<String>,
    pub avatar_id: Option<i64>,
    pub avatar_url: Option<String>,
    /// Stable opaque id handed to payment providers for anonymous billing.
    pub anon_user_id: Option<String>,
    pub email: Option<String>,
    /// Provider-qualified social identifier, e.g. `google:1234`.
    pub social_id: Option<String>,

    pub balance_tokens: Tokens,
    pub tokens_used_as_anon: i64,
    pub is_authorized: bool,

    pub consent_pd: bool,
    pub is_accepted_promo: bool,
    pub review_bonus_granted: bool,
    pub is_joined_in_channel: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One-time credit kinds layered on the ledger. Each kind maps to a
/// dedicated "already granted" flag on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusKind {
    Review,
    ChannelSubscription,
}

impl BonusKind {
    /// Column holding the grant flag for this kind.
    pub fn flag_column(&self) -> &'static str {
        match self {
            Self::Review => "review_bonus_granted",
            Self::ChannelSubscription => "is_joined_in_channel",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::ChannelSubscription => "channel_subscription",
        }
    }
}

/// Authenticated identity fields supplied by an external OAuth flow.
/// The core never verifies the claim itself.
#[derive(Debug, Clone, Default)]
pub struct IdentityClaim {
    pub social_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl IdentityClaim {
    pub fn is_empty(&self) -> bool {
        self.social_id.is_none() && self.email.is_none() && self.display_name.is_none()
    }
}
