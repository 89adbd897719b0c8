//! Engine preferences
//!
//! The list of known engines and the selected one, persisted as a small
//! JSON file. A missing file reads as defaults.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::error::{AttesterError, Result};
use crate::network::EngineAddress;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Known engines as `host:port`, sorted
    #[serde(default)]
    pub addresses: BTreeSet<String>,
    /// Selected engine
    #[serde(default)]
    pub address: Option<String>,
}

pub struct PreferencesStore {
    path: PathBuf,
    default_engine: EngineAddress,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, default_engine: EngineAddress) -> Self {
        Self { path: path.into(), default_engine }
    }

    pub async fn load(&self) -> Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, prefs: &Preferences) -> Result<()> {
        let content = serde_json::to_string_pretty(prefs)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Saved engines, or just the default engine when none are saved.
    pub async fn engines(&self) -> Result<BTreeSet<String>> {
        let prefs = self.load().await?;
        Ok(self.with_fallback(prefs.addresses))
    }

    fn with_fallback(&self, addresses: BTreeSet<String>) -> BTreeSet<String> {
        if addresses.is_empty() {
            BTreeSet::from([self.default_engine.to_string()])
        } else {
            addresses
        }
    }

    pub async fn current_engine(&self) -> Result<EngineAddress> {
        let prefs = self.load().await?;
        match prefs.address.as_deref().filter(|a| !a.is_empty()) {
            Some(raw) => match EngineAddress::parse(raw) {
                Ok(address) => Ok(address),
                Err(e) => {
                    warn!("Ignoring saved engine: {}", e);
                    Ok(self.default_engine.clone())
                }
            },
            None => Ok(self.default_engine.clone()),
        }
    }

    pub async fn save_engine(&self, address: &EngineAddress) -> Result<()> {
        let mut prefs = self.load().await?;
        prefs.address = Some(address.to_string());
        self.save(&prefs).await
    }

    /// Adds an engine to the saved set. Malformed or already saved
    /// addresses are rejected.
    pub async fn add_engine(&self, raw: &str) -> Result<EngineAddress> {
        let address = EngineAddress::parse(raw)?;
        let mut prefs = self.load().await?;
        let mut addresses = self.with_fallback(std::mem::take(&mut prefs.addresses));
        if !addresses.insert(address.to_string()) {
            return Err(AttesterError::ConfigurationInvalid(format!(
                "engine {} is already saved",
                address
            )));
        }
        prefs.addresses = addresses;
        self.save(&prefs).await?;
        Ok(address)
    }

    /// Returns whether the engine was saved.
    pub async fn remove_engine(&self, raw: &str) -> Result<bool> {
        let key = EngineAddress::parse(raw)
            .map(|a| a.to_string())
            .unwrap_or_else(|_| raw.trim().to_string());
        let mut prefs = self.load().await?;
        let removed = prefs.addresses.remove(&key);
        if removed {
            self.save(&prefs).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> PreferencesStore {
        PreferencesStore::new(dir.path().join("prefs.json"), EngineAddress::default())
    }

    #[tokio::test]
    async fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        assert_eq!(store.load().await.unwrap(), Preferences::default());
        assert_eq!(store.engines().await.unwrap(), BTreeSet::from(["127.0.0.1:8520".to_string()]));
        assert_eq!(store.current_engine().await.unwrap(), EngineAddress::default());
    }

    #[tokio::test]
    async fn test_add_select_remove() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let added = store.add_engine("http://10.0.0.2:8520/").await.unwrap();
        assert_eq!(added.to_string(), "10.0.0.2:8520");
        let engines = store.engines().await.unwrap();
        assert!(engines.contains("10.0.0.2:8520"));
        assert!(engines.contains("127.0.0.1:8520"));

        assert!(matches!(
            store.add_engine("10.0.0.2:8520").await,
            Err(AttesterError::ConfigurationInvalid(_))
        ));
        assert!(matches!(
            store.add_engine("10.0.0.2").await,
            Err(AttesterError::ConfigurationInvalid(_))
        ));

        store.save_engine(&added).await.unwrap();
        assert_eq!(store.current_engine().await.unwrap(), added);

        assert!(store.remove_engine("10.0.0.2:8520").await.unwrap());
        assert!(!store.remove_engine("10.0.0.2:8520").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_saved_engine_falls_back() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        tokio::fs::write(dir.path().join("prefs.json"), r#"{"address":"::nonsense::"}"#)
            .await
            .unwrap();

        assert_eq!(store.current_engine().await.unwrap(), EngineAddress::default());
    }
}
