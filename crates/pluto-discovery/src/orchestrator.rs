//! Discovery runs: enumerate, scan, dedupe, validate, persist

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use pluto_core::{DiscoveredMiner, MinerData, MinerStore, ScanHit, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::arp::HostScanner;
use crate::candidates::{chunk_array, dedupe_by_mac, partition_mock};
use crate::error::{DiscoveryError, Result};
use crate::interfaces::InterfaceEnumerator;
use crate::limiter::ConcurrencyLimiter;
use crate::mock::MockDeviceSource;
use crate::query::DeviceQuery;
use crate::validation::MinerOracle;

/// Placeholder used when no better type or MAC is known
pub const UNKNOWN: &str = "unknown";

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// IPs per oracle validation request
    pub batch_size: usize,
    /// Concurrent oracle requests
    pub validation_concurrency: usize,
    /// Concurrent arp-scan subprocesses
    pub scan_concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            validation_concurrency: 5,
            scan_concurrency: 4,
        }
    }
}

/// Narrowing applied to a single discovery run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFilter {
    /// Exact target (skips scanning) or IP fragment when `partial_match` is set
    pub ip: Option<String>,
    /// MAC fragment, case-insensitive
    pub mac: Option<String>,
    #[serde(default)]
    pub partial_match: bool,
}

impl DiscoveryFilter {
    fn direct_ip(&self) -> Option<&str> {
        self.ip.as_deref().filter(|ip| !ip.is_empty() && !self.partial_match)
    }

    fn keeps(&self, hit: &ScanHit) -> bool {
        if self.partial_match {
            if let Some(ip) = self.ip.as_deref().filter(|ip| !ip.is_empty()) {
                if !hit.ip.contains(ip) {
                    return false;
                }
            }
        }
        if let Some(mac) = self.mac.as_deref().filter(|mac| !mac.is_empty()) {
            if !hit.mac.contains(&mac.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Enumerating,
    Scanning,
    Deduplicating,
    Validating,
    Persisted,
    Failed,
}

/// Bookkeeping for one invocation of [`DiscoveryOrchestrator::discover`]
#[derive(Debug, Clone)]
pub struct DiscoveryRun {
    pub id: Uuid,
    pub stage: RunStage,
    pub started_at: DateTime<Utc>,
}

impl DiscoveryRun {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: RunStage::Idle,
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, stage: RunStage) {
        debug!(run = %self.id, from = ?self.stage, to = ?stage, "Discovery run stage");
        self.stage = stage;
    }

    fn fail(&mut self, err: DiscoveryError) -> DiscoveryError {
        error!(run = %self.id, stage = ?self.stage, error = %err, "Discovery run failed");
        self.stage = RunStage::Failed;
        err
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedInterface {
    pub interface: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceFailure {
    pub mac: String,
    pub error: String,
}

/// Outcome of a discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub run_id: Uuid,
    pub stage: RunStage,
    pub interfaces: Vec<String>,
    pub failed_interfaces: Vec<FailedInterface>,
    /// Raw hits across all interfaces, before dedupe
    pub hits: usize,
    /// Real candidates sent to the oracle
    pub candidates: usize,
    pub mock_candidates: usize,
    pub miners: Vec<DiscoveredMiner>,
    pub persistence_errors: Vec<PersistenceFailure>,
}

impl DiscoveryReport {
    fn new(run: &DiscoveryRun) -> Self {
        Self {
            run_id: run.id,
            stage: run.stage,
            interfaces: Vec::new(),
            failed_interfaces: Vec::new(),
            hits: 0,
            candidates: 0,
            mock_candidates: 0,
            miners: Vec::new(),
            persistence_errors: Vec::new(),
        }
    }
}

/// Discovery event for real-time updates
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    ScanStarted { run_id: Uuid },
    /// First sighting of a MAC
    MinerDiscovered(DiscoveredMiner),
    /// Known MAC seen again
    MinerUpdated(DiscoveredMiner),
    ScanCompleted { run_id: Uuid, found: usize, total: usize },
}

/// Model for a miner: validation result, then telemetry, then scan vendor
pub fn derive_miner_type(
    validation_model: Option<&str>,
    data: &MinerData,
    vendor: Option<&str>,
) -> String {
    let known = |s: &&str| !s.trim().is_empty() && *s != UNKNOWN;
    validation_model
        .filter(known)
        .or_else(|| data.model().filter(known))
        .or_else(|| vendor.filter(known))
        .unwrap_or(UNKNOWN)
        .to_string()
}

pub struct DiscoveryOrchestrator {
    config: DiscoveryConfig,
    interfaces: InterfaceEnumerator,
    scanner: Arc<dyn HostScanner>,
    oracle: Arc<dyn MinerOracle>,
    store: Arc<dyn MinerStore>,
    mock_source: Option<MockDeviceSource>,
    scan_limiter: ConcurrencyLimiter,
    validation_limiter: ConcurrencyLimiter,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoveryOrchestrator {
    pub fn new(
        config: DiscoveryConfig,
        interfaces: InterfaceEnumerator,
        scanner: Arc<dyn HostScanner>,
        oracle: Arc<dyn MinerOracle>,
        store: Arc<dyn MinerStore>,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(DiscoveryError::InvalidChunkSize(0));
        }
        let scan_limiter = ConcurrencyLimiter::new(config.scan_concurrency)?;
        let validation_limiter = ConcurrencyLimiter::new(config.validation_concurrency)?;
        let (event_tx, _) = broadcast::channel(100);

        Ok(Self {
            config,
            interfaces,
            scanner,
            oracle,
            store,
            mock_source: None,
            scan_limiter,
            validation_limiter,
            event_tx,
        })
    }

    /// Include mock servers from `source` in every run
    pub fn with_mock_source(mut self, source: MockDeviceSource) -> Self {
        self.mock_source = Some(source);
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn interfaces(&self) -> &InterfaceEnumerator {
        &self.interfaces
    }

    /// Subscribe to discovery events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Run one discovery pass and persist every confirmed miner
    pub async fn discover(&self, filter: &DiscoveryFilter) -> Result<DiscoveryReport> {
        let mut run = DiscoveryRun::new();
        let _ = self.event_tx.send(DiscoveryEvent::ScanStarted { run_id: run.id });

        let report = match filter.direct_ip() {
            Some(ip) => self.discover_direct(&mut run, ip, filter.mac.as_deref()).await,
            None => self.discover_network(&mut run, filter).await,
        }?;

        let _ = self.event_tx.send(DiscoveryEvent::ScanCompleted {
            run_id: run.id,
            found: report.miners.len(),
            total: report.candidates + report.mock_candidates,
        });
        info!(
            run = %run.id,
            miners = report.miners.len(),
            candidates = report.candidates,
            failed_interfaces = report.failed_interfaces.len(),
            "Discovery completed"
        );
        Ok(report)
    }

    async fn discover_network(
        &self,
        run: &mut DiscoveryRun,
        filter: &DiscoveryFilter,
    ) -> Result<DiscoveryReport> {
        run.advance(RunStage::Enumerating);
        let interfaces = self.interfaces.enumerate().await.map_err(|e| run.fail(e))?;

        run.advance(RunStage::Scanning);
        let mut report = DiscoveryReport::new(run);
        let mut hits = Vec::new();

        let scans = join_all(interfaces.iter().map(|iface| async move {
            let result = self
                .scan_limiter
                .execute(|| self.scanner.scan(iface))
                .await;
            (iface, result)
        }))
        .await;

        for (iface, result) in scans {
            match result {
                Ok(found) => {
                    debug!(interface = %iface, hosts = found.len(), "Interface scanned");
                    hits.extend(found);
                }
                Err(e) => {
                    if e.is_fatal() {
                        error!(interface = %iface, error = %e, "Interface rejected, skipping");
                    } else {
                        warn!(interface = %iface, error = %e, "Scan failed, skipping interface");
                    }
                    report.failed_interfaces.push(FailedInterface {
                        interface: iface.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.interfaces = interfaces;

        if let Some(source) = &self.mock_source {
            hits.extend(source.hits().await);
        }
        report.hits = hits.len();
        if hits.is_empty() {
            warn!("No hosts found by ARP scan, check that interfaces are up and addressed");
        }

        run.advance(RunStage::Deduplicating);
        let candidates: Vec<ScanHit> = dedupe_by_mac(hits)
            .into_iter()
            .filter(|hit| filter.keeps(hit))
            .collect();
        let (real, mock) = partition_mock(candidates);
        report.candidates = real.len();
        report.mock_candidates = mock.len();

        run.advance(RunStage::Validating);
        let confirmed = self.validate_candidates(&real).await.map_err(|e| run.fail(e))?;

        let fetched = join_all(confirmed.into_iter().map(|(hit, result)| async move {
            let data = self.fetch_data(&hit.ip, &hit.mac).await;
            let miner_type =
                derive_miner_type(result.model.as_deref(), &data, Some(&hit.vendor_or_type));
            DiscoveredMiner::new(hit.ip, hit.mac, miner_type, data)
        }))
        .await;

        // Mock devices are accepted without asking the oracle
        let mocks = join_all(mock.into_iter().map(|hit| async move {
            let data = self.fetch_data(&hit.ip, &hit.mac).await;
            let miner_type = derive_miner_type(None, &data, Some(&hit.vendor_or_type));
            DiscoveredMiner::new(hit.ip, hit.mac, miner_type, data)
        }))
        .await;

        for miner in fetched.into_iter().chain(mocks) {
            self.persist(miner, &mut report).await;
        }

        run.advance(RunStage::Persisted);
        report.stage = run.stage;
        Ok(report)
    }

    /// Validate a single known address without scanning
    async fn discover_direct(
        &self,
        run: &mut DiscoveryRun,
        ip: &str,
        mac_hint: Option<&str>,
    ) -> Result<DiscoveryReport> {
        info!(ip = %ip, "Bypassing ARP scan, validating address directly");
        run.advance(RunStage::Validating);
        let mut report = DiscoveryReport::new(run);
        report.candidates = 1;

        let result = self
            .validation_limiter
            .execute(|| self.oracle.validate_single_ip(ip))
            .await;

        match result {
            Some(result) if result.is_miner => {
                let mac_hint = mac_hint.filter(|m| !m.is_empty()).map(str::to_lowercase);
                let data = self
                    .fetch_data(ip, mac_hint.as_deref().unwrap_or(UNKNOWN))
                    .await;
                let mac = data
                    .mac()
                    .map(str::to_lowercase)
                    .or(mac_hint)
                    .filter(|m| m != UNKNOWN);
                let miner_type = derive_miner_type(result.model.as_deref(), &data, None);

                match mac {
                    Some(mac) => {
                        let miner = DiscoveredMiner::new(ip, mac, miner_type, data);
                        self.persist(miner, &mut report).await;
                    }
                    None => {
                        warn!(ip = %ip, "Miner has no known MAC, returning it without storing");
                        report
                            .miners
                            .push(DiscoveredMiner::new(ip, UNKNOWN, miner_type, data));
                    }
                }
            }
            Some(_) => info!(ip = %ip, "Address is not a supported miner"),
            None => warn!(ip = %ip, "No validation result for address"),
        }

        run.advance(RunStage::Persisted);
        report.stage = run.stage;
        Ok(report)
    }

    /// Ask the oracle about every candidate, batch by batch.
    /// Returns the hits it confirmed, paired with their results.
    async fn validate_candidates(
        &self,
        candidates: &[ScanHit],
    ) -> Result<Vec<(ScanHit, ValidationResult)>> {
        let mut by_ip: HashMap<&str, &ScanHit> = HashMap::new();
        let mut ips: Vec<String> = Vec::new();
        for hit in candidates {
            if by_ip.insert(hit.ip.as_str(), hit).is_none() {
                ips.push(hit.ip.clone());
            }
        }

        let batches = chunk_array(&ips, self.config.batch_size)?;
        debug!(candidates = ips.len(), batches = batches.len(), "Validating candidates");

        let results = join_all(batches.iter().map(|batch| {
            self.validation_limiter
                .execute(|| self.oracle.validate_batch(batch))
        }))
        .await;

        let mut seen = HashSet::new();
        let mut confirmed = Vec::new();
        for result in results.into_iter().flatten() {
            if let Some(err) = &result.error {
                debug!(ip = %result.ip, error = %err, "Oracle reported an error for address");
            }
            if !result.is_miner || !seen.insert(result.ip.clone()) {
                continue;
            }
            match by_ip.get(result.ip.as_str()) {
                Some(hit) => confirmed.push(((*hit).clone(), result)),
                None => {
                    warn!(ip = %result.ip, "Oracle confirmed an address that was never asked about")
                }
            }
        }

        info!(candidates = ips.len(), miners = confirmed.len(), "Validation finished");
        Ok(confirmed)
    }

    /// Deep-fetch telemetry, falling back to a minimal record
    async fn fetch_data(&self, ip: &str, mac: &str) -> MinerData {
        let data = self
            .validation_limiter
            .execute(|| self.oracle.fetch_miner_data(ip))
            .await;
        data.unwrap_or_else(|| MinerData::minimal(ip, Some(mac), None))
    }

    async fn persist(&self, miner: DiscoveredMiner, report: &mut DiscoveryReport) {
        let mac = miner.mac.clone();
        match self.upsert(miner).await {
            Ok((miner, is_new)) => {
                debug!(mac = %mac, ip = %miner.ip, new = is_new, "Persisted miner");
                let event = if is_new {
                    DiscoveryEvent::MinerDiscovered(miner.clone())
                } else {
                    DiscoveryEvent::MinerUpdated(miner.clone())
                };
                let _ = self.event_tx.send(event);
                report.miners.push(miner);
            }
            Err(e) => {
                error!(mac = %mac, error = %e, "Failed to persist miner");
                report.persistence_errors.push(PersistenceFailure {
                    mac,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Insert or fold into the stored record, keeping its identity
    async fn upsert(&self, fresh: DiscoveredMiner) -> Result<(DiscoveredMiner, bool)> {
        let (miner, is_new) = match self.store.find_by_mac(&fresh.mac).await? {
            Some(mut existing) => {
                existing.absorb(fresh);
                (existing, false)
            }
            None => (fresh, true),
        };
        self.store.upsert(miner.clone()).await?;
        Ok((miner, is_new))
    }

    /// Stored miners matching `query`
    pub async fn get_discovered_devices(
        &self,
        query: &DeviceQuery,
    ) -> Result<Vec<DiscoveredMiner>> {
        let miners = self.store.list().await?;
        Ok(miners.into_iter().filter(|m| query.matches(m)).collect())
    }

    /// One stored miner by MAC
    pub async fn lookup_discovered_device(&self, mac: &str) -> Result<Option<DiscoveredMiner>> {
        let miner = self.store.find_by_mac(&mac.to_lowercase()).await?;
        if miner.is_none() {
            debug!(mac = %mac, "No discovered miner for MAC");
        }
        Ok(miner)
    }
}
