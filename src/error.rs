//! Error type shared by the daemon's subsystems.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("options store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("webhook request failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("inventory {path} could not be read: {reason}")]
    Catalog { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, NotifierError>;
