//! verhook daemon entry point.
//!
//! `verhook` runs the daemon and `verhook send-now` posts the outdated
//! report once and exits. The periodic report is switched on and off
//! through the admin routes of the running daemon.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use log::{error, info, warn};
use tokio::signal;

mod catalog;
mod config;
mod error;
mod nonce;
mod options;
mod report;
mod scheduler;
mod server;
mod settings;
mod types;
mod update_event;
mod versions;
mod webhook;

use catalog::{ComponentCatalog, InventoryCatalog};
use config::Config;
use nonce::NonceRegistry;
use options::{FileOptions, OptionsStore};
use report::{OutdatedReportGenerator, ReportOutcome};
use scheduler::{CronScheduler, JobFn, ReportSchedule};
use server::{run_http_server, AdminGuard, AppState};
use update_event::UpdateEventHandler;
use webhook::{HttpWebhookSender, WebhookSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!(
        "Starting verhook for {} (state: {}, listen: {})",
        cfg.site_url,
        cfg.state_path.display(),
        cfg.listen
    );

    // Options store, seeded from configuration
    let options: Arc<dyn OptionsStore> = Arc::new(FileOptions::open(&cfg.state_path).await?);
    if cfg.webhook_url.is_some() || cfg.daily_webhook_url.is_some() {
        settings::save(
            options.as_ref(),
            cfg.webhook_url.as_deref(),
            cfg.daily_webhook_url.as_deref(),
        )
        .await?;
    }

    let catalog: Arc<dyn ComponentCatalog> = Arc::new(InventoryCatalog::new(
        cfg.components_path.clone(),
        cfg.updates_path.clone(),
    ));
    let sender: Arc<dyn WebhookSender> = Arc::new(HttpWebhookSender::new(Duration::from_secs(
        cfg.webhook_timeout_secs,
    ))?);
    let reports = Arc::new(OutdatedReportGenerator::new(
        cfg.site_url.clone(),
        options.clone(),
        catalog.clone(),
        sender.clone(),
    ));

    match std::env::args().nth(1).as_deref() {
        None | Some("serve") => {}
        Some("send-now") => {
            match reports.send_now().await {
                ReportOutcome::Disabled => warn!("Daily webhook URL is not configured."),
                outcome => info!("Report finished: {:?}", outcome),
            }
            return Ok(());
        }
        Some(other) => anyhow::bail!("Unknown command: {}", other),
    }

    let cron = Arc::new(CronScheduler::start().await?);

    // Periodic report
    let job_reports = Arc::clone(&reports);
    let daily_report: JobFn = Arc::new(move || -> BoxFuture<'static, ()> {
        let reports = Arc::clone(&job_reports);
        Box::pin(async move {
            if let ReportOutcome::Sent { delivered: false, .. } = reports.send_now().await {
                error!("Scheduled report could not be delivered");
            }
        })
    });
    let schedule = Arc::new(ReportSchedule::new(
        cron.clone(),
        options.clone(),
        cfg.report_recurrence,
        daily_report,
    ));
    schedule.resume().await?;

    // HTTP surface
    let state = AppState {
        options: options.clone(),
        updates: Arc::new(UpdateEventHandler::new(
            cfg.site_url.clone(),
            options.clone(),
            catalog,
            sender,
        )),
        reports,
        schedule,
        nonces: Arc::new(NonceRegistry::new(Duration::from_secs(
            cfg.nonce_lifetime_secs,
        ))),
        admin: Arc::new(AdminGuard::new(&cfg.admin_token, cfg.listen)),
    };
    if cfg.admin_token.is_empty() && !cfg.listen.ip().is_loopback() {
        warn!("No admin_token configured; admin routes will reject every request");
    }
    let listen = cfg.listen;
    let http_handle = tokio::spawn(async move {
        if let Err(e) = run_http_server(listen, state).await {
            error!("HTTP server failed: {}", e);
        }
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    http_handle.abort();
    if let Err(e) = cron.shutdown().await {
        warn!("Scheduler shutdown failed: {}", e);
    }

    info!("Shutdown complete.");
    Ok(())
}
