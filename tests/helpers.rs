use std::sync::Arc;

use tempfile::TempDir;
use textora_backend::config::{BillingConfig, DatabaseConfig};
use textora_backend::database::{create_pool, run_migrations};
use textora_backend::models::*;
use textora_backend::repositories::*;
use textora_backend::services::*;
use sqlx::SqlitePool;

/// Test database over a fresh on-disk SQLite file. The temp directory keeps
/// the file alive for the test's lifetime; multiple pool connections need a
/// real file, not `:memory:`.
pub struct TestDatabase {
    pub pool: SqlitePool,
    pub user_repo: Arc<UserRepository>,
    pub ledger_repo: Arc<LedgerRepository>,
    pub job_repo: Arc<JobRepository>,
    pub identity: Arc<IdentityService>,
    pub billing: Arc<BillingService>,
    _dir: TempDir,
}

impl TestDatabase {
    /// Create a new isolated test database with migrations applied.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let config = DatabaseConfig {
            url,
            max_connections: 5,
            acquire_timeout_secs: 10,
            busy_timeout_millis: 5_000,
        };

        let pool = create_pool(&config)
            .await
            .expect("Failed to create test database pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = Arc::new(UserRepository::new(pool.clone()));
        let ledger_repo = Arc::new(LedgerRepository::new(pool.clone()));
        let job_repo = Arc::new(JobRepository::new(pool.clone()));

        let billing_config = BillingConfig::default();
        let identity = Arc::new(IdentityService::new(
            Arc::clone(&user_repo),
            billing_config.clone(),
        ));
        let billing = Arc::new(BillingService::new(
            Arc::clone(&ledger_repo),
            billing_config,
        ));

        Self {
            pool,
            user_repo,
            ledger_repo,
            job_repo,
            identity,
            billing,
            _dir: dir,
        }
    }

    /// Create a user with the given whole-token balance.
    pub async fn user_with_balance(&self, tokens: i64) -> User {
        self.user_repo
            .create(None, Some("Test User"), Some(1), Tokens::from_whole(tokens))
            .await
            .expect("Failed to create test user")
    }

    /// Create an anonymous user pinned to an IP with the given balance.
    pub async fn anon_user(&self, ip: &str, tokens: i64) -> User {
        self.user_repo
            .create(Some(ip), Some("Anon"), Some(1), Tokens::from_whole(tokens))
            .await
            .expect("Failed to create anonymous test user")
    }
}
