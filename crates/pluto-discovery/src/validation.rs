//! Client for the miner identification oracle
//!
//! Every call carries its own timeout. Failures never propagate to the
//! caller: they are logged and absorbed into "no result" (`None` or `[]`).

use async_trait::async_trait;
use pluto_core::{MinerData, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{DiscoveryError, Result};

/// Default per-IP request timeout
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default cap for a whole batch request
pub const DEFAULT_MAX_BATCH_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL, e.g. `http://oracle:8000`
    pub base_url: String,
    pub timeout: Duration,
    pub max_batch_timeout: Duration,
}

impl OracleConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_ORACLE_TIMEOUT,
            max_batch_timeout: DEFAULT_MAX_BATCH_TIMEOUT,
        }
    }

    /// Timeout for a batch of `n` IPs: `timeout * (n + 1)`, capped
    pub fn batch_timeout(&self, n: usize) -> Duration {
        let factor = u32::try_from(n).unwrap_or(u32::MAX).saturating_add(1);
        self.timeout
            .checked_mul(factor)
            .map_or(self.max_batch_timeout, |t| t.min(self.max_batch_timeout))
    }
}

/// Classification and telemetry lookups for candidate IPs
#[async_trait]
pub trait MinerOracle: Send + Sync {
    /// Classify one IP; `None` when the oracle could not answer
    async fn validate_single_ip(&self, ip: &str) -> Option<ValidationResult>;

    /// Classify a batch of IPs; empty when the oracle could not answer
    async fn validate_batch(&self, ips: &[String]) -> Vec<ValidationResult>;

    /// Full telemetry for a confirmed miner
    async fn fetch_miner_data(&self, ip: &str) -> Option<MinerData>;
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    ips: &'a [String],
}

/// The oracle answers either with a bare array or with `{ "data": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValidateResponse {
    Bare(Vec<ValidationResult>),
    Wrapped { data: Vec<ValidationResult> },
}

impl ValidateResponse {
    fn into_results(self) -> Vec<ValidationResult> {
        match self {
            ValidateResponse::Bare(results) | ValidateResponse::Wrapped { data: results } => {
                results
            }
        }
    }
}

/// HTTP implementation of [`MinerOracle`]
#[derive(Debug, Clone)]
pub struct OracleClient {
    client: reqwest::Client,
    config: OracleConfig,
}

impl OracleClient {
    pub fn new(config: OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            DiscoveryError::InvalidConfiguration(format!("Failed to create HTTP client: {e}"))
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_validate(
        &self,
        ips: &[String],
        timeout: Duration,
    ) -> Result<Vec<ValidationResult>> {
        let response = self
            .client
            .post(self.url("/validate"))
            .timeout(timeout)
            .json(&ValidateRequest { ips })
            .send()
            .await
            .map_err(|e| request_error("validate", timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::OracleUnavailable(format!(
                "validate returned {status}"
            )));
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| request_error("validate", timeout, e))?;
        Ok(body.into_results())
    }

    async fn get_miner_data(&self, ip: &str) -> Result<Option<MinerData>> {
        let timeout = self.config.timeout;
        let response = self
            .client
            .get(self.url(&format!("/data/{ip}")))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error("miner data", timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::OracleUnavailable(format!(
                "miner data returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| request_error("miner data", timeout, e))?;
        Ok(MinerData::from_value(body))
    }
}

fn request_error(operation: &str, timeout: Duration, e: reqwest::Error) -> DiscoveryError {
    if e.is_timeout() {
        DiscoveryError::timeout(format!("oracle {operation} request"), timeout)
    } else {
        DiscoveryError::OracleUnavailable(format!("{operation}: {e}"))
    }
}

#[async_trait]
impl MinerOracle for OracleClient {
    async fn validate_single_ip(&self, ip: &str) -> Option<ValidationResult> {
        let ips = [ip.to_string()];
        match self.post_validate(&ips, self.config.timeout).await {
            Ok(results) => results.into_iter().next(),
            Err(e) => {
                error!(ip = %ip, error = %e, "Validation request failed");
                None
            }
        }
    }

    async fn validate_batch(&self, ips: &[String]) -> Vec<ValidationResult> {
        if ips.is_empty() {
            return Vec::new();
        }

        let timeout = self.config.batch_timeout(ips.len());
        debug!(count = ips.len(), timeout = ?timeout, "Validating batch");

        match self.post_validate(ips, timeout).await {
            Ok(results) => results,
            Err(e) => {
                error!(count = ips.len(), error = %e, "Batch validation failed");
                Vec::new()
            }
        }
    }

    async fn fetch_miner_data(&self, ip: &str) -> Option<MinerData> {
        match self.get_miner_data(ip).await {
            Ok(Some(data)) => Some(data),
            Ok(None) => {
                debug!(ip = %ip, "Oracle returned no usable miner data");
                None
            }
            Err(e) => {
                warn!(ip = %ip, error = %e, "Failed to fetch miner data");
                None
            }
        }
    }
}
