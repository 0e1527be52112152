//! Turns completed component updates into webhook notices.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::catalog::ComponentCatalog;
use crate::error::Result;
use crate::options::OptionsStore;
use crate::settings;
use crate::types::{local_timestamp, UpdateDelta, UpdateEvent};
use crate::versions::{VersionStore, UNKNOWN_VERSION};
use crate::webhook::{self, WebhookSender};

pub struct UpdateEventHandler {
    site_url: String,
    options: Arc<dyn OptionsStore>,
    catalog: Arc<dyn ComponentCatalog>,
    sender: Arc<dyn WebhookSender>,
}

impl UpdateEventHandler {
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

    /// Processes one update event and returns the deltas it produced.
    ///
    /// The catalog must already report the post-update metadata when this
    /// runs; whatever version it reports is taken as the new version.
    /// Every component's new version is recorded even if the webhook is
    /// disabled or delivery fails. The record is written once, after all
    /// components have been handled.
    pub async fn handle(&self, event: &UpdateEvent) -> Result<Vec<UpdateDelta>> {
        if !event.is_component_update() {
            debug!(
                "Ignoring {}/{} event with {} items",
                event.kind,
                event.action,
                event.plugins.len()
            );
            return Ok(Vec::new());
        }

        let mut versions = VersionStore::load(self.options.as_ref()).await?;
        let webhook_url = settings::update_webhook_url(self.options.as_ref()).await;
        let update_time = local_timestamp();
        let mut deltas = Vec::with_capacity(event.plugins.len());

        for component_id in &event.plugins {
            let old_version = versions.get(component_id);
            let (display_name, new_version) = self.resolve(component_id).await;
            let delta = UpdateDelta {
                component_id: component_id.clone(),
                old_version,
                new_version,
                display_name,
                timestamp: update_time.clone(),
            };

            if !webhook_url.is_empty() {
                webhook::send(self.sender.as_ref(), &webhook_url, &delta.notice(&self.site_url)).await;
            }

            info!(
                "{} updated {} -> {}",
                delta.component_id, delta.old_version, delta.new_version
            );
            versions.set(component_id, &delta.new_version);
            deltas.push(delta);
        }

        versions.persist().await?;
        Ok(deltas)
    }

    /// Display name and installed version, falling back to the id and
    /// "Unknown" when the catalog has nothing usable.
    async fn resolve(&self, component_id: &str) -> (String, String) {
        let component = match self.catalog.component(component_id).await {
            Ok(component) => component,
            Err(e) => {
                warn!("Metadata lookup for {} failed: {}", component_id, e);
                None
            }
        };
        match component {
            Some(c) => (
                non_empty_or(c.name, component_id),
                non_empty_or(c.version, UNKNOWN_VERSION),
            ),
            None => (component_id.to_string(), UNKNOWN_VERSION.to_string()),
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
