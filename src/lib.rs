//! Token-billed text recognition and generation backend.
//!
//! Anonymous visitors are identified by IP and merged into their account on
//! login; every paid operation moves through the token ledger; jobs run
//! through a two-stage pipeline (recognition then generation) on background
//! workers.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use std::sync::Arc;

use sqlx::SqlitePool;

use repositories::{JobRepository, LedgerRepository, UserRepository};
use services::pipeline::{self, Generator, PipelineOrchestrator, Recognizer};
use services::{BillingService, IdentityService, JobService};

/// Shared application state: the pool, repositories and services wired
/// together, with the pipeline workers already running.
pub struct AppState {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub users: Arc<UserRepository>,
    pub ledger: Arc<LedgerRepository>,
    pub identity: Arc<IdentityService>,
    pub billing: Arc<BillingService>,
    pub jobs: Arc<JobService>,
}

impl AppState {
    /// Wire up repositories and services over `pool` and spawn the pipeline
    /// worker pool. Must be called from within a Tokio runtime.
    pub fn new(
        pool: SqlitePool,
        config: AppConfig,
        recognizer: Arc<dyn Recognizer>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let users = Arc::new(UserRepository::new(pool.clone()));
        let ledger = Arc::new(LedgerRepository::new(pool.clone()));
        let job_repo = Arc::new(JobRepository::new(pool.clone()));

        let identity = Arc::new(IdentityService::new(
            Arc::clone(&users),
            config.billing.clone(),
        ));
        let billing = Arc::new(BillingService::new(
            Arc::clone(&ledger),
            config.billing.clone(),
        ));

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            Arc::clone(&job_repo),
            recognizer,
            generator,
            config.pipeline.stage_timeout(),
        ));
        let handle = pipeline::spawn_workers(orchestrator, config.pipeline.workers);

        let jobs = Arc::new(JobService::new(
            job_repo,
            Arc::clone(&ledger),
            Arc::clone(&identity),
            handle,
            config.billing.clone(),
        ));

        Self {
            config,
            pool,
            users,
            ledger,
            identity,
            billing,
            jobs,
        }
    }
}
