//! Application state management

use anyhow::{Context, Result};
use pluto_core::{JsonFileStore, MemoryMinerStore, MinerStore};
use pluto_discovery::{
    ArpScanner, DiscoveryEvent, DiscoveryOrchestrator, InterfaceEnumerator, MockDeviceSource,
    OracleClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Discovery pipeline
    pub orchestrator: Arc<DiscoveryOrchestrator>,
}

impl AppState {
    /// Wire the pipeline from configuration
    pub async fn new(config: &Config) -> Result<Arc<Self>> {
        let store: Arc<dyn MinerStore> = match &config.storage.path {
            Some(path) => {
                let store = JsonFileStore::open(path)
                    .with_context(|| format!("Failed to open miner store {}", path.display()))?;
                info!(path = %path.display(), "Using JSON miner store");
                Arc::new(store)
            }
            None => {
                info!("Using in-memory miner store");
                Arc::new(MemoryMinerStore::new())
            }
        };

        let oracle = Arc::new(OracleClient::new(config.oracle_config()?)?);
        let scanner = Arc::new(ArpScanner::new(config.arp_scan_config()));
        let interfaces = InterfaceEnumerator::new(config.arp_scan.interfaces.clone());

        let mut orchestrator = DiscoveryOrchestrator::new(
            config.discovery_config(),
            interfaces,
            scanner,
            oracle,
            store,
        )?;

        if config.mock.enabled {
            if let Some(url) = &config.mock.discovery_url {
                let timeout = Duration::from_millis(config.oracle.timeout_ms);
                let source = MockDeviceSource::new(url, timeout)?;
                info!(url = %url, "Mock device detection enabled");
                orchestrator = orchestrator.with_mock_source(source);
            }
        }

        Ok(Self::with_orchestrator(Arc::new(orchestrator)))
    }

    /// State around an already-built pipeline
    pub fn with_orchestrator(orchestrator: Arc<DiscoveryOrchestrator>) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }

    /// Subscribe to discovery events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.orchestrator.subscribe()
    }
}
