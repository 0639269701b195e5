use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::Tokens;

/// Ledger entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Charge,
    Purchase,
    Refund,
    Promo,
    GatewayPayment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Purchase => "purchase",
            Self::Refund => "refund",
            Self::Promo => "promo",
            Self::GatewayPayment => "gateway_payment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

/// Immutable ledger entry. Rows are append-only: retries and webhook
/// redeliveries create new rows matched by `reference`, never updates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub job_id: Option<Uuid>,

    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub provider: Option<String>,
    pub status: Option<TransactionStatus>,

    /// Monetary amount in minor currency units (kopecks, cents).
    pub amount_minor: Option<i64>,
    pub tokens_delta: Option<Tokens>,
    pub currency: String,

    pub plan: Option<String>,
    /// Free-form idempotency reference (gateway payment id, intent key).
    pub reference: Option<String>,
    pub meta: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Monetary amount as a decimal in major currency units.
    pub fn amount(&self) -> Option<Decimal> {
        self.amount_minor.map(|minor| Decimal::new(minor, 2))
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(TransactionStatus::Success)
    }
}
