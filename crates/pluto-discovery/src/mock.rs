//! Synthetic scan hits for mock miners
//!
//! A mock discovery service lists running mock servers by port. Each one is
//! reported as a scan hit on the discovery host with a reserved MAC derived
//! from its port, so it flows through the pipeline like a real device.

use pluto_core::ScanHit;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::candidates::{mock_mac_from_port, PortLike};
use crate::error::{DiscoveryError, Result};

/// Vendor/type recorded on every mock hit
pub const MOCK_DEVICE_TYPE: &str = "mock";

#[derive(Debug, Deserialize)]
struct ServersResponse {
    #[serde(default)]
    servers: Vec<MockServer>,
}

#[derive(Debug, Deserialize)]
struct MockServer {
    #[serde(default)]
    port: Value,
}

#[derive(Debug, Clone)]
pub struct MockDeviceSource {
    client: reqwest::Client,
    discovery_url: Url,
    timeout: Duration,
}

impl MockDeviceSource {
    pub fn new(discovery_url: &str, timeout: Duration) -> Result<Self> {
        let discovery_url = Url::parse(discovery_url).map_err(|e| {
            DiscoveryError::InvalidConfiguration(format!(
                "Invalid mock discovery URL {discovery_url:?}: {e}"
            ))
        })?;
        if discovery_url.host_str().is_none() {
            return Err(DiscoveryError::InvalidConfiguration(format!(
                "Mock discovery URL has no host: {discovery_url}"
            )));
        }

        let client = reqwest::Client::builder().build().map_err(|e| {
            DiscoveryError::InvalidConfiguration(format!("Failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            discovery_url,
            timeout,
        })
    }

    /// Host the mock servers listen on
    pub fn host(&self) -> &str {
        self.discovery_url.host_str().unwrap_or("localhost")
    }

    /// Hits for every listed mock server; empty (and logged) on any failure
    pub async fn hits(&self) -> Vec<ScanHit> {
        match self.fetch_hits().await {
            Ok(hits) => {
                info!(count = hits.len(), "Mock servers retrieved");
                hits
            }
            Err(e) => {
                warn!(error = %e, "Failed to list mock servers, continuing without them");
                Vec::new()
            }
        }
    }

    async fn fetch_hits(&self) -> Result<Vec<ScanHit>> {
        let url = format!("{}/servers", self.discovery_url.as_str().trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DiscoveryError::timeout("mock server listing", self.timeout)
                } else {
                    DiscoveryError::MockSourceUnavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::MockSourceUnavailable(format!(
                "server listing returned {}",
                response.status()
            )));
        }

        let body: ServersResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::MockSourceUnavailable(e.to_string()))?;

        Ok(self.hits_from_servers(body.servers))
    }

    fn hits_from_servers(&self, servers: Vec<MockServer>) -> Vec<ScanHit> {
        let host = self.host();
        servers
            .into_iter()
            .filter_map(|server| {
                let Some(port) = server.port.to_port() else {
                    debug!(port = %server.port, "Skipping mock server with invalid port");
                    return None;
                };
                let mac = mock_mac_from_port(port)?;
                Some(ScanHit::new(format!("{host}:{port}"), mac, MOCK_DEVICE_TYPE))
            })
            .collect()
    }
}
