use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod inventory;
pub use inventory::InventoryCatalog;

/// An installed component as the host currently reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledComponent {
    /// Stable id, e.g. `sample/sample.php`.
    pub file: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A newer version the host knows about for an installed component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub file: String,
    pub new_version: String,
}

#[async_trait]
pub trait ComponentCatalog: Send + Sync {
    /// All installed components, in host order.
    async fn installed(&self) -> Result<Vec<InstalledComponent>>;

    /// Update metadata as last fetched by the host. May be stale.
    async fn available_updates(&self) -> Result<Vec<AvailableUpdate>>;

    /// Metadata of one component. Called after an update has completed,
    /// so it has to reflect the newly installed version.
    async fn component(&self, file: &str) -> Result<Option<InstalledComponent>> {
        Ok(self.installed().await?.into_iter().find(|c| c.file == file))
    }
}
