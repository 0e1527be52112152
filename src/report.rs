//! Daily snapshot of installed versus available component versions.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::catalog::{AvailableUpdate, ComponentCatalog, InstalledComponent};
use crate::options::OptionsStore;
use crate::settings;
use crate::types::{local_timestamp, OutdatedReport, OutdatedReportEntry};
use crate::webhook::{self, WebhookSender};

/// What a send-now run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The daily webhook URL is empty; nothing was generated.
    Disabled,
    /// The report was generated and handed to the webhook sender.
    Sent { components: usize, outdated: usize, delivered: bool },
}

pub struct OutdatedReportGenerator {
    site_url: String,
    options: Arc<dyn OptionsStore>,
    catalog: Arc<dyn ComponentCatalog>,
    sender: Arc<dyn WebhookSender>,
}

impl OutdatedReportGenerator {
    pub fn new(
        site_url: String,
        options: Arc<dyn OptionsStore>,
        catalog: Arc<dyn ComponentCatalog>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            site_url,
            options,
            catalog,
            sender,
        }
    }

    /// Builds the report from whatever the catalog can provide. An
    /// unreadable inventory yields an empty component list.
    pub async fn generate(&self) -> OutdatedReport {
        let installed = self.catalog.installed().await.unwrap_or_else(|e| {
            warn!("Component inventory unavailable, reporting none: {}", e);
            Vec::new()
        });
        let updates = self.catalog.available_updates().await.unwrap_or_else(|e| {
            warn!("Update metadata unavailable, reporting without it: {}", e);
            Vec::new()
        });
        build_report(&self.site_url, local_timestamp(), &installed, &updates)
    }

    /// Generates the report and posts it to the daily webhook as a single
    /// payload. Returns without enumerating anything when the URL is empty.
    pub async fn send_now(&self) -> ReportOutcome {
        let url = settings::daily_webhook_url(self.options.as_ref()).await;
        if url.is_empty() {
            debug!("Daily webhook URL not configured, skipping report");
            return ReportOutcome::Disabled;
        }

        let report = self.generate().await;
        let delivered = webhook::send(self.sender.as_ref(), &url, &report).await;
        let outcome = ReportOutcome::Sent {
            components: report.plugins.len(),
            outdated: report.outdated_count(),
            delivered,
        };
        info!("Outdated report: {:?}", outcome);
        outcome
    }
}

/// Pairs every installed component with the update metadata for it.
///
/// A component is outdated only when the metadata names a version that
/// differs from the installed one.
pub fn build_report(
    site_url: &str,
    generated_at: String,
    installed: &[InstalledComponent],
    updates: &[AvailableUpdate],
) -> OutdatedReport {
    let offers: HashMap<&str, &str> = updates
        .iter()
        .map(|u| (u.file.as_str(), u.new_version.as_str()))
        .collect();

    let plugins = installed
        .iter()
        .map(|component| {
            let available = offers
                .get(component.file.as_str())
                .filter(|v| **v != component.version);
            OutdatedReportEntry {
                component_id: component.file.clone(),
                display_name: component.name.clone(),
                current_version: component.version.clone(),
                available_version: available
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| component.version.clone()),
                is_outdated: available.is_some(),
            }
        })
        .collect();

    OutdatedReport {
        site_url: site_url.to_string(),
        generated_at,
        plugins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::StaticCatalog;
    use crate::options::MemoryOptions;
    use crate::webhook::testing::RecordingSender;

    const DAILY: &str = "https://hooks.example.com/daily";

    fn generator(
        catalog: StaticCatalog,
        sender: Arc<RecordingSender>,
    ) -> (Arc<MemoryOptions>, OutdatedReportGenerator) {
        let options = Arc::new(MemoryOptions::new());
        let generator = OutdatedReportGenerator::new(
            "https://site.example.com".into(),
            options.clone(),
            Arc::new(catalog),
            sender,
        );
        (options, generator)
    }

    fn sample_catalog() -> StaticCatalog {
        StaticCatalog::new(
            &[
                ("akismet/akismet.php", "Akismet", "5.0"),
                ("sample/sample.php", "Sample Plugin", "1.2"),
                ("pinned/pinned.php", "Pinned", "2.0"),
            ],
            &[("akismet/akismet.php", "5.3"), ("pinned/pinned.php", "2.0")],
        )
    }

    #[test]
    fn outdated_iff_metadata_names_a_different_version() {
        let catalog = sample_catalog();
        let installed = catalog.installed.lock().unwrap().clone();
        let updates = catalog.updates.lock().unwrap().clone();
        let report = build_report("s", "t".into(), &installed, &updates);

        let akismet = &report.plugins[0];
        assert!(akismet.is_outdated);
        assert_eq!(akismet.current_version, "5.0");
        assert_eq!(akismet.available_version, "5.3");

        let sample = &report.plugins[1];
        assert!(!sample.is_outdated);
        assert_eq!(sample.available_version, "1.2");

        let pinned = &report.plugins[2];
        assert!(!pinned.is_outdated);
        assert_eq!(pinned.available_version, "2.0");
    }

    #[tokio::test]
    async fn sends_whole_report_as_one_payload() {
        let sender = Arc::new(RecordingSender::default());
        let (options, generator) = generator(sample_catalog(), sender.clone());
        settings::save(&*options, None, Some(DAILY)).await.unwrap();

        let outcome = generator.send_now().await;
        assert_eq!(
            outcome,
            ReportOutcome::Sent {
                components: 3,
                outdated: 1,
                delivered: true
            }
        );

        let posts = sender.posts();
        assert_eq!(posts.len(), 1);
        let (url, body) = &posts[0];
        assert_eq!(url, DAILY);
        assert_eq!(body["site_url"], "https://site.example.com");
        assert!(body["date"].is_string());
        assert_eq!(body["plugins"].as_array().unwrap().len(), 3);
        assert_eq!(body["plugins"][0]["plugin_file"], "akismet/akismet.php");
        assert_eq!(body["plugins"][0]["outdated"], true);
    }

    #[tokio::test]
    async fn empty_url_sends_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let (_options, generator) = generator(sample_catalog(), sender.clone());

        assert_eq!(generator.send_now().await, ReportOutcome::Disabled);
        assert!(sender.posts().is_empty());
    }

    #[tokio::test]
    async fn empty_url_skips_enumeration() {
        let mut catalog = sample_catalog();
        catalog.broken = true;
        let (_options, generator) = generator(catalog, Arc::new(RecordingSender::default()));

        assert_eq!(generator.send_now().await, ReportOutcome::Disabled);
    }

    #[tokio::test]
    async fn repeated_runs_differ_only_in_date() {
        let sender = Arc::new(RecordingSender::default());
        let (options, generator) = generator(sample_catalog(), sender.clone());
        settings::save(&*options, None, Some(DAILY)).await.unwrap();

        generator.send_now().await;
        generator.send_now().await;

        let mut bodies: Vec<_> = sender.posts().into_iter().map(|(_, body)| body).collect();
        for body in &mut bodies {
            body.as_object_mut().unwrap().remove("date");
        }
        assert_eq!(
            serde_json::to_vec(&bodies[0]).unwrap(),
            serde_json::to_vec(&bodies[1]).unwrap()
        );
    }

    #[tokio::test]
    async fn failed_delivery_is_reported_not_raised() {
        let sender = Arc::new(RecordingSender::failing());
        let (options, generator) = generator(sample_catalog(), sender.clone());
        settings::save(&*options, None, Some(DAILY)).await.unwrap();

        match generator.send_now().await {
            ReportOutcome::Sent { delivered, .. } => assert!(!delivered),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreadable_inventory_still_sends_empty_report() {
        let mut catalog = sample_catalog();
        catalog.broken = true;
        let sender = Arc::new(RecordingSender::default());
        let (options, generator) = generator(catalog, sender.clone());
        settings::save(&*options, None, Some(DAILY)).await.unwrap();

        assert_eq!(
            generator.send_now().await,
            ReportOutcome::Sent {
                components: 0,
                outdated: 0,
                delivered: true
            }
        );
        let posts = sender.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1["plugins"], serde_json::json!([]));
        assert_eq!(posts[0].1["site_url"], "https://site.example.com");
    }
}
