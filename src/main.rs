use std::env;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use textora_backend::database::{create_pool, run_migrations};
use textora_backend::services::{GptClient, OcrClient};
use textora_backend::{AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(anyhow::Error::msg)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "textora_backend={},sqlx=warn",
            config.log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(environment = %config.environment, "Starting textora backend");

    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database ready");

    let api_key = env::var("YANDEX_API_KEY").context("YANDEX_API_KEY is required")?;
    let folder_id = env::var("YANDEX_FOLDER_ID").context("YANDEX_FOLDER_ID is required")?;

    let recognizer = Arc::new(OcrClient::new(api_key.clone(), folder_id.clone()));
    let generator = Arc::new(GptClient::new(api_key, folder_id));

    let state = AppState::new(pool, config, recognizer, generator);
    info!(
        workers = state.config.pipeline.workers,
        "Pipeline workers running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
