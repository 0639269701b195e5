use std::env;
use std::time::Duration;

use crate::models::Tokens;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub busy_timeout_millis: u64,
}

/// Pipeline worker configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of background worker tasks draining the job queue.
    pub workers: usize,
    /// Upper bound for each external stage call; exceeding it fails the stage.
    pub stage_timeout_secs: u64,
}

/// Billing knobs: signup grant, anonymous quota, one-time bonus amounts.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub signup_balance: Tokens,
    /// Jobs an unauthenticated user may run before being asked to log in.
    pub anon_job_quota: i64,
    pub review_bonus: Tokens,
    pub subscription_bonus: Tokens,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub billing: BillingConfig,
    pub log_level: String,
    pub environment: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://textora.db?mode=rwc".to_string());

        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32);
        let acquire_timeout_secs = env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS", 30u64);
        let busy_timeout_millis = env_parse("DATABASE_BUSY_TIMEOUT_MILLIS", 5_000u64);

        // Validate configuration
        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            busy_timeout_millis,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get busy timeout as Duration
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_millis)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://textora.db?mode=rwc".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            busy_timeout_millis: 5_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, String> {
        let workers = env_parse("PIPELINE_WORKERS", 4usize);
        let stage_timeout_secs = env_parse("PIPELINE_STAGE_TIMEOUT_SECS", 60u64);

        if workers == 0 {
            return Err("PIPELINE_WORKERS must be greater than 0".to_string());
        }
        if stage_timeout_secs == 0 {
            return Err("PIPELINE_STAGE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            workers,
            stage_timeout_secs,
        })
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stage_timeout_secs: 60,
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, String> {
        let signup_balance = Tokens::from_whole(env_parse("SIGNUP_BALANCE_TOKENS", 5i64));
        let anon_job_quota = env_parse("ANON_JOB_QUOTA", 2i64);
        let review_bonus = Tokens::from_whole(env_parse("REVIEW_BONUS_TOKENS", 1i64));
        let subscription_bonus = Tokens::from_whole(env_parse("SUBSCRIPTION_BONUS_TOKENS", 1i64));

        if signup_balance.is_negative() {
            return Err("SIGNUP_BALANCE_TOKENS must not be negative".to_string());
        }
        if anon_job_quota < 0 {
            return Err("ANON_JOB_QUOTA must not be negative".to_string());
        }

        Ok(Self {
            signup_balance,
            anon_job_quota,
            review_bonus,
            subscription_bonus,
        })
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            signup_balance: Tokens::from_whole(5),
            anon_job_quota: 2,
            review_bonus: Tokens::from_whole(1),
            subscription_bonus: Tokens::from_whole(1),
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let pipeline = PipelineConfig::from_env()?;
        let billing = BillingConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            database,
            pipeline,
            billing,
            log_level: log_level.to_lowercase(),
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Get database URL (convenience method)
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            billing: BillingConfig::default(),
            log_level: "info".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(config.is_development());
        assert!(!config.is_production());
        assert_eq!(config.billing.signup_balance, Tokens::from_whole(5));
        assert_eq!(config.billing.anon_job_quota, 2);
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.stage_timeout(), Duration::from_secs(60));
    }
}
