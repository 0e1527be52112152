//! Last-seen version of every component that went through an update.

use std::collections::BTreeMap;

use log::warn;

use crate::error::Result;
use crate::options::OptionsStore;

pub const VERSIONS_KEY: &str = "component_versions";

/// Reported when a component has no recorded or resolvable version.
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Snapshot of the version record.
///
/// `set` only touches the in-memory copy; nothing reaches the options
/// store until `persist`, which writes the whole mapping at once.
pub struct VersionStore<'a> {
    options: &'a dyn OptionsStore,
    versions: BTreeMap<String, String>,
}

impl<'a> VersionStore<'a> {
    pub async fn load(options: &'a dyn OptionsStore) -> Result<Self> {
        let versions = match options.get(VERSIONS_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Discarding unreadable version record: {}", e);
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        Ok(Self { options, versions })
    }

    pub fn get(&self, component_id: &str) -> String {
        self.versions
            .get(component_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    pub fn set(&mut self, component_id: &str, version: &str) {
        self.versions
            .insert(component_id.to_string(), version.to_string());
    }

    pub async fn persist(&self) -> Result<()> {
        self.options
            .set(VERSIONS_KEY, serde_json::to_value(&self.versions)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MemoryOptions;
    use serde_json::{json, Value};

    async fn recorded_version(options: &dyn OptionsStore, component_id: &str) -> Result<String> {
        Ok(VersionStore::load(options).await?.get(component_id))
    }

    #[tokio::test]
    async fn unseen_component_is_unknown() {
        let options = MemoryOptions::new();
        let store = VersionStore::load(&options).await.unwrap();
        assert_eq!(store.get("sample/sample.php"), "Unknown");
    }

    #[tokio::test]
    async fn set_is_buffered_until_persist() {
        let options = MemoryOptions::new();
        let mut store = VersionStore::load(&options).await.unwrap();
        store.set("sample/sample.php", "1.2");

        assert_eq!(store.get("sample/sample.php"), "1.2");
        assert_eq!(
            recorded_version(&options, "sample/sample.php").await.unwrap(),
            "Unknown"
        );

        store.persist().await.unwrap();
        assert_eq!(
            recorded_version(&options, "sample/sample.php").await.unwrap(),
            "1.2"
        );
    }

    #[tokio::test]
    async fn stale_entries_are_kept() {
        let options = MemoryOptions::new();
        options
            .set(VERSIONS_KEY, json!({"gone/gone.php": "0.9", "a/a.php": "1.0"}))
            .await
            .unwrap();

        let mut store = VersionStore::load(&options).await.unwrap();
        store.set("a/a.php", "1.1");
        store.persist().await.unwrap();

        assert_eq!(
            options.get(VERSIONS_KEY).await.unwrap(),
            Some(json!({"a/a.php": "1.1", "gone/gone.php": "0.9"}))
        );
    }

    #[tokio::test]
    async fn malformed_record_starts_empty() {
        let options = MemoryOptions::new();
        options
            .set(VERSIONS_KEY, Value::String("oops".into()))
            .await
            .unwrap();
        let store = VersionStore::load(&options).await.unwrap();
        assert!(store.versions.is_empty());
    }
}
