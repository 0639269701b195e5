//! Job intake: billing checks, the token debit, job creation and hand-off to
//! the pipeline workers. The caller gets the queued job back immediately;
//! processing happens in the background.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Job, Tokens, User};
use crate::repositories::{JobRepository, LedgerRepository};
use crate::services::identity::IdentityService;
use crate::services::pipeline::{PipelineHandle, StagedInput};

pub struct JobService {
    jobs: Arc<JobRepository>,
    ledger: Arc<LedgerRepository>,
    identity: Arc<IdentityService>,
    pipeline: PipelineHandle,
    billing: BillingConfig,
}

impl JobService {
    pub fn new(
        jobs: Arc<JobRepository>,
        ledger: Arc<LedgerRepository>,
        identity: Arc<IdentityService>,
        pipeline: PipelineHandle,
        billing: BillingConfig,
    ) -> Self {
        Self {
            jobs,
            ledger,
            identity,
            pipeline,
            billing,
        }
    }

    /// Create and enqueue a job for a known user. One token is debited up
    /// front and recorded as the job's reservation; the job comes back in
    /// `queued` while the pipeline runs in the background.
    pub async fn create_job(
        &self,
        user_id: Uuid,
        input: StagedInput,
        input_url: Option<&str>,
    ) -> AppResult<Job> {
        let user = self.identity.get_user(user_id).await?;
        self.create_for_user(&user, input, input_url).await
    }

    /// Create and enqueue a job for the anonymous user behind an IP,
    /// creating that user on first sight.
    pub async fn create_job_for_ip(
        &self,
        ip: &str,
        input: StagedInput,
        input_url: Option<&str>,
    ) -> AppResult<Job> {
        let user = self.identity.find_or_create_by_ip(ip).await?;
        self.create_for_user(&user, input, input_url).await
    }

    async fn create_for_user(
        &self,
        user: &User,
        input: StagedInput,
        input_url: Option<&str>,
    ) -> AppResult<Job> {
        if !user.is_authorized && user.tokens_used_as_anon >= self.billing.anon_job_quota {
            return Err(AppError::QuotaExceeded(format!(
                "Anonymous quota of {} jobs reached, please sign in",
                self.billing.anon_job_quota
            )));
        }

        self.ledger.debit(user.id, Tokens::ONE, None).await?;

        let job = self
            .jobs
            .create_queued(
                user.id,
                user.anon_user_id.as_deref(),
                Tokens::ONE,
                input_url,
                Some(input.mime_type()),
            )
            .await?;

        info!(job_id = %job.id, user_id = %user.id, "Job created and queued");
        self.pipeline.enqueue(job.id, input)?;

        Ok(job)
    }

    /// Create a per-order job that waits for its payment before running.
    /// Nothing is debited; the order's payment covers the reservation.
    pub async fn create_order_job(
        &self,
        user_id: Uuid,
        order_id: &str,
        input_url: Option<&str>,
        input_mime_type: Option<&str>,
    ) -> AppResult<Job> {
        if order_id.is_empty() {
            return Err(AppError::Validation("Order id is required".to_string()));
        }

        let user = self.identity.get_user(user_id).await?;

        let job = self
            .jobs
            .create_waiting_payment(
                user.id,
                user.anon_user_id.as_deref(),
                order_id,
                Tokens::ONE,
                input_url,
                input_mime_type,
            )
            .await?;

        info!(job_id = %job.id, %order_id, "Order job created, awaiting payment");
        Ok(job)
    }

    /// Confirm an order's payment, moving its job to `queued`. Enqueues the
    /// job when its staged input is supplied.
    pub async fn mark_order_paid(
        &self,
        order_id: &str,
        payment_info: &serde_json::Value,
        input: Option<StagedInput>,
    ) -> AppResult<Job> {
        let job = self.jobs.mark_order_paid(order_id, payment_info).await?;
        info!(job_id = %job.id, %order_id, "Order paid, job queued");

        if let Some(input) = input {
            self.pipeline.enqueue(job.id, input)?;
        }

        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> AppResult<Job> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Job not found".to_string()))
    }

    pub async fn list_jobs(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Job>> {
        Ok(self.jobs.find_by_user(user_id, limit).await?)
    }

    /// Jobs left in `processing` since before `cutoff`, for reconciliation.
    pub async fn stalled_jobs(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Job>> {
        Ok(self.jobs.find_stalled(cutoff).await?)
    }
}
