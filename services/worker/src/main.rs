use anyhow::Result;
use common::database;
use tokio_cron_scheduler::JobScheduler;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod config;
mod jobs;

use crate::config::WorkerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting background worker");

    let config = WorkerConfig::from_env();

    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let mut scheduler = JobScheduler::new().await?;
    jobs::register(&scheduler, pool.clone(), &config).await?;
    scheduler.start().await?;

    info!("Background worker started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down background worker");

    scheduler.shutdown().await?;
    pool.close().await;

    Ok(())
}
