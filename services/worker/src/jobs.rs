//! Scheduled maintenance jobs

use anyhow::Result;
use common::{alerts::create_low_stock_alerts, error::DatabaseResult};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::WorkerConfig;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub registrations: u64,
    pub password_resets: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.registrations + self.password_resets
    }
}

/// Drop sign-ups and password resets whose code has expired
pub async fn purge_expired_codes(pool: &PgPool) -> DatabaseResult<PurgeReport> {
    let registrations = sqlx::query("DELETE FROM pending_registrations WHERE expires_at < NOW()")
        .execute(pool)
        .await?
        .rows_affected();

    let password_resets = sqlx::query("DELETE FROM password_resets WHERE expires_at < NOW()")
        .execute(pool)
        .await?
        .rows_affected();

    Ok(PurgeReport {
        registrations,
        password_resets,
    })
}

/// Register every job on `scheduler`; the caller starts it
pub async fn register(scheduler: &JobScheduler, pool: PgPool, config: &WorkerConfig) -> Result<()> {
    let purge_pool = pool.clone();
    let purge = Job::new_async(config.purge_schedule.as_str(), move |_, _| {
        let pool = purge_pool.clone();
        Box::pin(async move {
            match purge_expired_codes(&pool).await {
                Ok(report) if report.total() > 0 => info!(
                    "Purged {} expired registrations and {} password resets",
                    report.registrations, report.password_resets
                ),
                Ok(_) => {}
                Err(e) => error!("Failed to purge expired codes: {}", e),
            }
        })
    })?;
    scheduler.add(purge).await?;
    info!("Scheduled code purge: {}", config.purge_schedule);

    let alerts = Job::new_async(config.stock_alert_schedule.as_str(), move |_, _| {
        let pool = pool.clone();
        Box::pin(async move {
            if let Err(e) = create_low_stock_alerts(&pool).await {
                error!("Low stock sweep failed: {}", e);
            }
        })
    })?;
    scheduler.add(alerts).await?;
    info!("Scheduled low stock sweep: {}", config.stock_alert_schedule);

    Ok(())
}
