//! Periodic report job and its activation lifecycle.
//!
//! The job record is persisted in the options store so the firing time
//! stays anchored to the first activation across restarts. Activation and
//! deactivation are both idempotent, and a deactivated job stays off
//! across restarts until it is activated again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use futures_util::future::BoxFuture;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::error::Result;
use crate::options::OptionsStore;

/// Name of the outdated report job.
pub const DAILY_REPORT_JOB: &str = "daily_report";
/// Options key holding the persisted job record.
pub const SCHEDULED_JOBS_KEY: &str = "scheduled_jobs";
/// Options key set while the report job is switched off.
pub const DEACTIVATED_KEY: &str = "daily_report_deactivated";

pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Hourly,
    Twicedaily,
    Daily,
    Weekly,
}

impl Recurrence {
    pub fn interval(self) -> Duration {
        match self {
            Recurrence::Hourly => Duration::from_secs(60 * 60),
            Recurrence::Twicedaily => Duration::from_secs(12 * 60 * 60),
            Recurrence::Daily => Duration::from_secs(24 * 60 * 60),
            Recurrence::Weekly => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// A recurring job anchored at the time it was first registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job: String,
    pub recurrence: Recurrence,
    pub first_run: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(job: &str, recurrence: Recurrence, first_run: DateTime<Utc>) -> Self {
        Self {
            job: job.to_string(),
            recurrence,
            first_run,
        }
    }

    /// Six-field cron expression (UTC) firing at the anchor's time slot.
    pub fn cron_expression(&self) -> String {
        let t = self.first_run;
        let (s, m, h) = (t.second(), t.minute(), t.hour());
        match self.recurrence {
            Recurrence::Hourly => format!("{s} {m} * * * *"),
            Recurrence::Twicedaily => format!("{s} {m} {},{} * * *", h % 12, h % 12 + 12),
            Recurrence::Daily => format!("{s} {m} {h} * * *"),
            Recurrence::Weekly => {
                format!("{s} {m} {h} * * {}", t.weekday().num_days_from_sunday())
            }
        }
    }
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn is_scheduled(&self, job: &str) -> bool;
    async fn schedule(&self, job: &ScheduledJob, run: JobFn) -> Result<()>;
    async fn cancel(&self, job: &str) -> Result<()>;
}

/// [`Scheduler`] backed by `tokio-cron-scheduler`.
pub struct CronScheduler {
    inner: JobScheduler,
    jobs: Mutex<HashMap<String, Uuid>>,
}

impl CronScheduler {
    pub async fn start() -> Result<Self> {
        let inner = JobScheduler::new().await?;
        inner.start().await?;
        Ok(Self {
            inner,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.clone();
        inner.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl Scheduler for CronScheduler {
    async fn is_scheduled(&self, job: &str) -> bool {
        self.jobs.lock().await.contains_key(job)
    }

    async fn schedule(&self, job: &ScheduledJob, run: JobFn) -> Result<()> {
        let expr = job.cron_expression();
        let cron_job = Job::new_async(expr.as_str(), move |_uuid, _l| {
            let run = run.clone();
            Box::pin(async move {
                run().await;
            })
        })?;

        let mut jobs = self.jobs.lock().await;
        if let Some(previous) = jobs.remove(&job.job) {
            self.inner.remove(&previous).await?;
        }
        let id = self.inner.add(cron_job).await?;
        jobs.insert(job.job.clone(), id);
        info!("Scheduled {} with cron '{}'", job.job, expr);
        Ok(())
    }

    async fn cancel(&self, job: &str) -> Result<()> {
        if let Some(id) = self.jobs.lock().await.remove(job) {
            self.inner.remove(&id).await?;
            info!("Cancelled {}", job);
        }
        Ok(())
    }
}

async fn load_record(options: &dyn OptionsStore) -> Option<ScheduledJob> {
    let value = match options.get(SCHEDULED_JOBS_KEY).await {
        Ok(value) => value?,
        Err(e) => {
            warn!("Failed to read scheduled job record: {}", e);
            return None;
        }
    };
    serde_json::from_value(value)
        .map_err(|e| warn!("Ignoring unreadable scheduled job record: {}", e))
        .ok()
}

/// The outdated report job bound to a live scheduler.
pub struct ReportSchedule {
    scheduler: Arc<dyn Scheduler>,
    options: Arc<dyn OptionsStore>,
    recurrence: Recurrence,
    run: JobFn,
}

impl ReportSchedule {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        options: Arc<dyn OptionsStore>,
        recurrence: Recurrence,
        run: JobFn,
    ) -> Self {
        Self {
            scheduler,
            options,
            recurrence,
            run,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.scheduler.is_scheduled(DAILY_REPORT_JOB).await
    }

    pub async fn is_deactivated(&self) -> bool {
        matches!(
            self.options.get(DEACTIVATED_KEY).await,
            Ok(Some(Value::Bool(true)))
        )
    }

    /// Startup path. Registers the job unless it was deactivated.
    pub async fn resume(&self) -> Result<bool> {
        if self.is_deactivated().await {
            info!("{} is deactivated, not scheduling it", DAILY_REPORT_JOB);
            return Ok(false);
        }
        self.register().await
    }

    /// Clears a previous deactivation and registers the job. Returns whether
    /// a new registration happened.
    pub async fn activate(&self) -> Result<bool> {
        self.options.delete(DEACTIVATED_KEY).await?;
        self.register().await
    }

    /// Cancels the job, drops its record and keeps it off across restarts.
    /// Safe to call when nothing is scheduled.
    pub async fn deactivate(&self) -> Result<()> {
        self.scheduler.cancel(DAILY_REPORT_JOB).await?;
        self.options.delete(SCHEDULED_JOBS_KEY).await?;
        self.options.set(DEACTIVATED_KEY, Value::Bool(true)).await?;
        info!("Deactivated {}", DAILY_REPORT_JOB);
        Ok(())
    }

    async fn register(&self) -> Result<bool> {
        if self.is_active().await {
            return Ok(false);
        }

        let options = self.options.as_ref();
        let record = match load_record(options).await {
            Some(record)
                if record.job == DAILY_REPORT_JOB && record.recurrence == self.recurrence =>
            {
                record
            }
            _ => ScheduledJob::new(DAILY_REPORT_JOB, self.recurrence, Utc::now()),
        };
        self.scheduler.schedule(&record, self.run.clone()).await?;
        options
            .set(SCHEDULED_JOBS_KEY, serde_json::to_value(&record)?)
            .await?;
        info!(
            "Activated {} (every {:?}, anchored at {})",
            record.job,
            record.recurrence.interval(),
            record.first_run
        );
        Ok(true)
    }
}
