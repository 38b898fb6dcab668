//! Worker configuration

use std::env;

const DEFAULT_PURGE_SCHEDULE: &str = "0 */15 * * * *";
const DEFAULT_STOCK_ALERT_SCHEDULE: &str = "0 0 * * * *";

/// Cron schedules of the background jobs, with seconds as the first field
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub purge_schedule: String,
    pub stock_alert_schedule: String,
}

fn schedule_var(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl WorkerConfig {
    /// Create a new WorkerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `WORKER_PURGE_SCHEDULE`: expired sign-up and reset codes (default: every 15 minutes)
    /// - `WORKER_STOCK_ALERT_SCHEDULE`: low-stock sweep (default: hourly)
    pub fn from_env() -> Self {
        Self {
            purge_schedule: schedule_var("WORKER_PURGE_SCHEDULE", DEFAULT_PURGE_SCHEDULE),
            stock_alert_schedule: schedule_var(
                "WORKER_STOCK_ALERT_SCHEDULE",
                DEFAULT_STOCK_ALERT_SCHEDULE,
            ),
        }
    }
}
