//! Repository for job rows and their status lifecycle.
//!
//! Status changes are compare-and-swap UPDATEs keyed on the expected current
//! status, so a regression out of a terminal state is impossible at the
//! storage level no matter how callers race.

use crate::error::RepositoryError;
use crate::models::{Job, JobStatus, Tokens};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, user_id, anon_user_id, order_id, status, ocr_operation_id, \
     gpt_response_id, tokens_reserved, tokens_consumed, input_url, input_mime_type, \
     detected_text, generated_text, error_message, payment_info, pipeline_meta, is_ok, \
     created_at, updated_at";

pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pre-paid job at `queued`. The token debit happens before this
    /// call; `tokens_reserved` records what was debited.
    pub async fn create_queued(
        &self,
        user_id: Uuid,
        anon_user_id: Option<&str>,
        tokens_reserved: Tokens,
        input_url: Option<&str>,
        input_mime_type: Option<&str>,
    ) -> Result<Job, RepositoryError> {
        self.insert(
            user_id,
            anon_user_id,
            None,
            JobStatus::Queued,
            tokens_reserved,
            input_url,
            input_mime_type,
        )
        .await
    }

    /// Insert a per-order job at `waiting_payment`, keyed by a unique
    /// external order id. It moves to `queued` when the payment webhook
    /// confirms the order.
    pub async fn create_waiting_payment(
        &self,
        user_id: Uuid,
        anon_user_id: Option<&str>,
        order_id: &str,
        tokens_reserved: Tokens,
        input_url: Option<&str>,
        input_mime_type: Option<&str>,
    ) -> Result<Job, RepositoryError> {
        self.insert(
            user_id,
            anon_user_id,
            Some(order_id),
            JobStatus::WaitingPayment,
            tokens_reserved,
            input_url,
            input_mime_type,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert(
        &self,
        user_id: Uuid,
        anon_user_id: Option<&str>,
        order_id: Option<&str>,
        status: JobStatus,
        tokens_reserved: Tokens,
        input_url: Option<&str>,
        input_mime_type: Option<&str>,
    ) -> Result<Job, RepositoryError> {
        if tokens_reserved < Tokens::ZERO {
            return Err(RepositoryError::InvalidInput(
                "Token reservation must not be negative".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, user_id, anon_user_id, order_id, status, tokens_reserved,
                              tokens_consumed, input_url, input_mime_type, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(anon_user_id)
        .bind(order_id)
        .bind(status)
        .bind(tokens_reserved)
        .bind(input_url)
        .bind(input_mime_type)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Job vanished after insert".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    pub async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Job>, RepositoryError> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE order_id = ?1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    pub async fn find_by_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Job>, RepositoryError> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE user_id = ?1 \
             ORDER BY created_at DESC, id LIMIT ?2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Compare-and-swap a job from `from` to `to`. Illegal transitions are
    /// rejected before touching storage; a legal transition whose expected
    /// status no longer matches (lost race) is a `Conflict`.
    pub async fn transition(
        &self,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<(), RepositoryError> {
        if !from.can_transition_to(to) {
            return Err(RepositoryError::InvalidInput(format!(
                "Illegal job transition {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let result =
            sqlx::query("UPDATE jobs SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2")
                .bind(job_id)
                .bind(from)
                .bind(to)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Job {} is not in status {}",
                job_id,
                from.as_str()
            )));
        }

        Ok(())
    }

    /// Persist the recognition stage output and its metadata.
    pub async fn record_recognition(
        &self,
        job_id: Uuid,
        detected_text: &str,
        operation_id: Option<&str>,
        meta: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET detected_text = ?2,
                ocr_operation_id = ?3,
                pipeline_meta = json_set(COALESCE(pipeline_meta, '{}'), '$.ocr', json(?4)),
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(detected_text)
        .bind(operation_id)
        .bind(meta.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Job not found".to_string()));
        }

        Ok(())
    }

    /// Persist the generation stage output and its metadata.
    pub async fn record_generation(
        &self,
        job_id: Uuid,
        generated_text: &str,
        response_id: Option<&str>,
        meta: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET generated_text = ?2,
                gpt_response_id = ?3,
                pipeline_meta = json_set(COALESCE(pipeline_meta, '{}'), '$.gpt', json(?4)),
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(generated_text)
        .bind(response_id)
        .bind(meta.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Job not found".to_string()));
        }

        Ok(())
    }

    /// Settle a job as `done`: the whole reservation is consumed and the
    /// completion flag set. Only legal from `processing`.
    pub async fn mark_done(&self, job_id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'done',
                tokens_consumed = tokens_reserved,
                is_ok = 1,
                error_message = NULL,
                updated_at = ?2
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Job {} is not processing",
                job_id
            )));
        }

        Ok(())
    }

    /// Settle a job as `failed`, recording the cause. Reserved tokens stay
    /// debited; there is no refund on failure. Only legal from `processing`.
    pub async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_message = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Job {} is not processing",
                job_id
            )));
        }

        Ok(())
    }

    /// Move a per-order job to `queued` after its payment is confirmed,
    /// stashing the gateway's payload.
    pub async fn mark_order_paid(
        &self,
        order_id: &str,
        payment_info: &serde_json::Value,
    ) -> Result<Job, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued',
                payment_info = json_set(COALESCE(payment_info, '{}'), '$.gateway', json(?2)),
                updated_at = ?3
            WHERE order_id = ?1 AND status = 'waiting_payment'
            "#,
        )
        .bind(order_id)
        .bind(payment_info.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "Order {} is not awaiting payment",
                order_id
            )));
        }

        self.find_by_order_id(order_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Job not found".to_string()))
    }

    /// Jobs stuck in `processing` since before `cutoff`. A crash between
    /// `queued` and a terminal state leaves such rows behind; an external
    /// reconciler can find them here.
    pub async fn find_stalled(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Job>, RepositoryError> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'processing' AND updated_at < ?1 ORDER BY updated_at"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}
