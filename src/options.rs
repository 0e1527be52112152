//! Key-value options store.
//!
//! Everything the daemon persists lives behind [`OptionsStore`]: the two
//! webhook URLs, the last-seen component versions and the scheduled job
//! record.  Each key holds one JSON value and every write replaces the
//! value for its key wholesale.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::Result;

#[async_trait]
pub trait OptionsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Reads a string option, falling back to an empty string when the key is
/// unset, unreadable or not a string.
pub async fn get_string(store: &dyn OptionsStore, key: &str) -> String {
    match store.get(key).await {
        Ok(Some(Value::String(s))) => s,
        Ok(_) => String::new(),
        Err(e) => {
            warn!("Failed to read option {}: {}", key, e);
            String::new()
        }
    }
}

/// Options persisted as a single JSON object on disk.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so readers never observe a half-written file. The lock is held across
/// the write, which keeps concurrent writers in order.
pub struct FileOptions {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl FileOptions {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} options from {}", values.len(), path.display());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    async fn write(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(values)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl OptionsStore for FileOptions {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().await;
        let previous = values.insert(key.to_string(), value);
        if let Err(e) = self.write(&values).await {
            match previous {
                Some(v) => values.insert(key.to_string(), v),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        if let Some(previous) = values.remove(key) {
            if let Err(e) = self.write(&values).await {
                values.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}

/// In-process options for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryOptions {
    values: std::sync::Mutex<BTreeMap<String, Value>>,
}

#[cfg(test)]
impl MemoryOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl OptionsStore for MemoryOptions {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.remove(key);
        Ok(())
    }
}
