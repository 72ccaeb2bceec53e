//! Pluto Discovery - finding and validating ASIC miners on local networks
//!
//! Active interfaces are ARP-scanned under a concurrency limit, the hits are
//! deduplicated by MAC, and the surviving candidates are checked against a
//! miner identification oracle. Confirmed miners are written to a
//! [`pluto_core::MinerStore`].

pub mod arp;
pub mod candidates;
pub mod error;
pub mod interfaces;
pub mod limiter;
pub mod mock;
pub mod orchestrator;
pub mod query;
pub mod validation;

pub use arp::{parse_arp_scan_output, ArpScanConfig, ArpScanner, HostScanner};
pub use candidates::{chunk_array, dedupe_by_mac, is_mock_device, is_mock_value, mock_mac_from_port};
pub use error::{DiscoveryError, Result};
pub use interfaces::{parse_interface_list, parse_interface_names, InterfaceEnumerator};
pub use limiter::ConcurrencyLimiter;
pub use mock::MockDeviceSource;
pub use orchestrator::{
    DiscoveryConfig, DiscoveryEvent, DiscoveryFilter, DiscoveryOrchestrator, DiscoveryReport,
    RunStage,
};
pub use query::{DeviceQuery, MatchMode};
pub use validation::{MinerOracle, OracleClient, OracleConfig};
