//! Persistence for discovered miners
//!
//! Records are keyed by lowercase MAC address. Writes are last-writer-wins per
//! MAC and independent of each other, so no cross-record transactions exist.
//!
//! Two stores are provided:
//! - [`MemoryMinerStore`] keeps everything in process memory
//! - [`JsonFileStore`] mirrors the collection to a single JSON document,
//!   rewritten through a temp file on every upsert

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::miner::DiscoveredMiner;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Storage backend for [`DiscoveredMiner`] records
#[async_trait]
pub trait MinerStore: Send + Sync {
    /// Insert or replace the record stored under `miner.mac`
    async fn upsert(&self, miner: DiscoveredMiner) -> Result<(), StoreError>;

    async fn find_by_mac(&self, mac: &str) -> Result<Option<DiscoveredMiner>, StoreError>;

    /// All records, ordered by MAC
    async fn list(&self) -> Result<Vec<DiscoveredMiner>, StoreError>;
}

fn store_key(mac: &str) -> String {
    mac.to_lowercase()
}

/// In-process store, lost on restart
#[derive(Debug, Default)]
pub struct MemoryMinerStore {
    miners: RwLock<BTreeMap<String, DiscoveredMiner>>,
}

impl MemoryMinerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MinerStore for MemoryMinerStore {
    async fn upsert(&self, miner: DiscoveredMiner) -> Result<(), StoreError> {
        self.miners.write().await.insert(store_key(&miner.mac), miner);
        Ok(())
    }

    async fn find_by_mac(&self, mac: &str) -> Result<Option<DiscoveredMiner>, StoreError> {
        Ok(self.miners.read().await.get(&store_key(mac)).cloned())
    }

    async fn list(&self) -> Result<Vec<DiscoveredMiner>, StoreError> {
        Ok(self.miners.read().await.values().cloned().collect())
    }
}

/// On-disk document layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Version of the document format
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub miners: Vec<DiscoveredMiner>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl StoreDocument {
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the document or start an empty one if the file doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self {
                version: default_version(),
                miners: Vec::new(),
            })
        }
    }
}

/// Store backed by a JSON file
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    miners: RwLock<BTreeMap<String, DiscoveredMiner>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading any existing records
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let document = StoreDocument::load_or_create(&path)?;
        let miners: BTreeMap<String, DiscoveredMiner> = document
            .miners
            .into_iter()
            .map(|m| (store_key(&m.mac), m))
            .collect();

        info!(path = %path.display(), records = miners.len(), "Opened miner store");

        Ok(Self {
            path,
            miners: RwLock::new(miners),
        })
    }

    async fn save(&self, miners: &BTreeMap<String, DiscoveredMiner>) -> Result<(), StoreError> {
        let document = StoreDocument {
            version: default_version(),
            miners: miners.values().cloned().collect(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), records = document.miners.len(), "Saved miner store");
        Ok(())
    }
}

#[async_trait]
impl MinerStore for JsonFileStore {
    async fn upsert(&self, miner: DiscoveredMiner) -> Result<(), StoreError> {
        let mut miners = self.miners.write().await;
        let key = store_key(&miner.mac);
        let previous = miners.insert(key.clone(), miner);

        if let Err(e) = self.save(&miners).await {
            // Keep memory in step with what is on disk
            match previous {
                Some(old) => miners.insert(key, old),
                None => miners.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn find_by_mac(&self, mac: &str) -> Result<Option<DiscoveredMiner>, StoreError> {
        Ok(self.miners.read().await.get(&store_key(mac)).cloned())
    }

    async fn list(&self) -> Result<Vec<DiscoveredMiner>, StoreError> {
        Ok(self.miners.read().await.values().cloned().collect())
    }
}
