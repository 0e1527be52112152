//! Data structures exchanged with the host and with webhook receivers.
//!
//! The payload structs serialise to the exact JSON bodies that receivers
//! consume, so their field names are part of the wire format.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Event kind that carries component updates.
pub const COMPONENT_KIND: &str = "plugin";
/// Action of a completed update.
pub const UPDATE_ACTION: &str = "update";

/// Notification from the host that an upgrade run has finished.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub action: String,
    /// Updated component ids in delivery order.
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl UpdateEvent {
    #[cfg(test)]
    pub fn component_update(plugins: Vec<String>) -> Self {
        Self {
            kind: COMPONENT_KIND.into(),
            action: UPDATE_ACTION.into(),
            plugins,
        }
    }

    /// Whether this event should be turned into version deltas.
    pub fn is_component_update(&self) -> bool {
        self.kind == COMPONENT_KIND && self.action == UPDATE_ACTION && !self.plugins.is_empty()
    }
}

/// Old to new version change of one component within an update event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDelta {
    pub component_id: String,
    pub old_version: String,
    pub new_version: String,
    pub display_name: String,
    pub timestamp: String,
}

impl UpdateDelta {
    pub fn notice<'a>(&'a self, site_url: &'a str) -> UpdateNotice<'a> {
        UpdateNotice {
            site_url,
            plugin_name: &self.display_name,
            old_version: &self.old_version,
            new_version: &self.new_version,
            update_time: &self.timestamp,
        }
    }
}

/// Body posted to the update webhook, one per updated component.
#[derive(Debug, Serialize)]
pub struct UpdateNotice<'a> {
    pub site_url: &'a str,
    pub plugin_name: &'a str,
    pub old_version: &'a str,
    pub new_version: &'a str,
    pub update_time: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutdatedReportEntry {
    #[serde(rename = "plugin_file")]
    pub component_id: String,
    #[serde(rename = "plugin_name")]
    pub display_name: String,
    pub current_version: String,
    #[serde(rename = "new_version")]
    pub available_version: String,
    #[serde(rename = "outdated")]
    pub is_outdated: bool,
}

/// Body posted to the daily report webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutdatedReport {
    pub site_url: String,
    #[serde(rename = "date")]
    pub generated_at: String,
    pub plugins: Vec<OutdatedReportEntry>,
}

impl OutdatedReport {
    pub fn outdated_count(&self) -> usize {
        self.plugins.iter().filter(|p| p.is_outdated).count()
    }
}

/// Host-local wall clock time as `YYYY-MM-DD HH:MM:SS`.
pub fn local_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
