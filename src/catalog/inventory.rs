use super::{AvailableUpdate, ComponentCatalog, InstalledComponent};
use crate::error::{NotifierError, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Catalog read from two JSON files maintained by the host:
///
/// * the component inventory, an array of `{file, name, version}`;
/// * the update metadata, an object keyed by component file whose values
///   are either a version string or `{"new_version": ...}`.
///
/// Both files are re-read on every call so post-update state is picked up
/// without a restart.
pub struct InventoryCatalog {
    components_path: PathBuf,
    updates_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UpdateOffer {
    Version(String),
    Detailed { new_version: String },
}

impl UpdateOffer {
    fn into_version(self) -> String {
        match self {
            UpdateOffer::Version(v) => v,
            UpdateOffer::Detailed { new_version } => new_version,
        }
    }
}

impl InventoryCatalog {
    pub fn new(components_path: impl Into<PathBuf>, updates_path: impl Into<PathBuf>) -> Self {
        Self {
            components_path: components_path.into(),
            updates_path: updates_path.into(),
        }
    }

    async fn read(path: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(catalog_error(path, e)),
        }
    }
}

fn catalog_error(path: &Path, e: impl std::fmt::Display) -> NotifierError {
    NotifierError::Catalog {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl ComponentCatalog for InventoryCatalog {
    async fn installed(&self) -> Result<Vec<InstalledComponent>> {
        let path = &self.components_path;
        let raw = Self::read(path)
            .await?
            .ok_or_else(|| catalog_error(path, "file not found"))?;
        serde_json::from_str(&raw).map_err(|e| catalog_error(path, e))
    }

    async fn available_updates(&self) -> Result<Vec<AvailableUpdate>> {
        let path = &self.updates_path;
        let Some(raw) = Self::read(path).await? else {
            debug!("No update metadata at {}", path.display());
            return Ok(Vec::new());
        };
        let offers: BTreeMap<String, UpdateOffer> =
            serde_json::from_str(&raw).map_err(|e| catalog_error(path, e))?;
        Ok(offers
            .into_iter()
            .map(|(file, offer)| AvailableUpdate {
                file,
                new_version: offer.into_version(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn catalog(dir: &tempfile::TempDir) -> InventoryCatalog {
        InventoryCatalog::new(
            dir.path().join("components.json"),
            dir.path().join("updates.json"),
        )
    }

    #[tokio::test]
    async fn reads_components_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("components.json"),
            r#"[
                {"file": "zeta/zeta.php", "name": "Zeta", "version": "3.1"},
                {"file": "alpha/alpha.php", "name": "Alpha", "version": "0.2"}
            ]"#,
        )
        .unwrap();

        let installed = catalog(&dir).installed().await.unwrap();
        let files: Vec<_> = installed.iter().map(|c| c.file.as_str()).collect();
        assert_eq!(files, ["zeta/zeta.php", "alpha/alpha.php"]);
    }

    #[tokio::test]
    async fn component_lookup_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components.json");
        fs::write(&path, r#"[{"file": "a/a.php", "name": "A", "version": "1.0"}]"#).unwrap();
        let catalog = catalog(&dir);
        assert_eq!(catalog.component("a/a.php").await.unwrap().unwrap().version, "1.0");

        fs::write(&path, r#"[{"file": "a/a.php", "name": "A", "version": "1.1"}]"#).unwrap();
        assert_eq!(catalog.component("a/a.php").await.unwrap().unwrap().version, "1.1");
        assert!(catalog.component("b/b.php").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_inventory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = catalog(&dir).installed().await.unwrap_err();
        assert!(matches!(err, NotifierError::Catalog { .. }));
    }

    #[tokio::test]
    async fn update_metadata_accepts_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("updates.json"),
            r#"{"a/a.php": "2.0", "b/b.php": {"new_version": "5.0", "package": "https://x"}}"#,
        )
        .unwrap();

        let updates = catalog(&dir).available_updates().await.unwrap();
        assert_eq!(
            updates,
            vec![
                AvailableUpdate { file: "a/a.php".into(), new_version: "2.0".into() },
                AvailableUpdate { file: "b/b.php".into(), new_version: "5.0".into() },
            ]
        );
    }

    #[tokio::test]
    async fn missing_update_metadata_means_no_updates() {
        let dir = tempfile::tempdir().unwrap();
        assert!(catalog(&dir).available_updates().await.unwrap().is_empty());
    }
}
