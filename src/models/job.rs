use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::Tokens;

/// Job lifecycle states. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    WaitingPayment,
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingPayment => "waiting_payment",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Legal status transitions. Anything else is a programming error and is
    /// rejected before touching storage.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::WaitingPayment, Self::Queued)
                | (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Done)
                | (Self::Processing, Self::Failed)
        )
    }
}

/// One unit of paid asynchronous work, driven exclusively by the job state
/// machine. Rows are never deleted; failed jobs keep their audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    /// Anonymous-owner hint captured at creation so billing survives a later
    /// identity merge.
    pub anon_user_id: Option<String>,
    /// External order reference for the per-order (pay-first) flow.
    pub order_id: Option<String>,

    pub status: JobStatus,
    pub ocr_operation_id: Option<String>,
    pub gpt_response_id: Option<String>,

    pub tokens_reserved: Tokens,
    pub tokens_consumed: Tokens,

    pub input_url: Option<String>,
    pub input_mime_type: Option<String>,
    pub detected_text: Option<String>,
    pub generated_text: Option<String>,
    pub error_message: Option<String>,

    pub payment_info: Option<Json<serde_json::Value>>,
    pub pipeline_meta: Option<Json<serde_json::Value>>,
    pub is_ok: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::WaitingPayment.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_terminal_states_do_not_regress() {
        for terminal in [JobStatus::Done, JobStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                JobStatus::WaitingPayment,
                JobStatus::Queued,
                JobStatus::Processing,
                JobStatus::Done,
                JobStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!JobStatus::WaitingPayment.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Done));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Failed));
    }
}
