//! Configuration loading and validation
//!
//! Values come from an optional TOML file, then from environment variables,
//! then from command-line flags. The merged result is validated once at
//! startup and the process refuses to start on any invalid value.

use anyhow::{bail, Context, Result};
use pluto_discovery::interfaces::parse_interface_list;
use pluto_discovery::{ArpScanConfig, DiscoveryConfig, OracleConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub arp_scan: ArpScanSection,
    #[serde(default)]
    pub mock: MockSection,
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSection {
    /// Base URL of the miner identification service (required)
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_oracle_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_batch_timeout_ms")]
    pub max_batch_timeout_ms: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_oracle_timeout_ms(),
            max_batch_timeout_ms: default_max_batch_timeout_ms(),
        }
    }
}

fn default_oracle_timeout_ms() -> u64 {
    3000
}

fn default_max_batch_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_validation_concurrency")]
    pub concurrency: usize,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_validation_concurrency(),
        }
    }
}

fn default_batch_size() -> usize {
    20
}

fn default_validation_concurrency() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArpScanSection {
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default = "default_retry")]
    pub retry: u32,
    /// Per-host timeout passed to the tool
    #[serde(default = "default_arp_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub ignore_dups: bool,
    /// Concurrent arp-scan subprocesses
    #[serde(default = "default_scan_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Comma-separated interface names; unset means "ask the OS"
    #[serde(default)]
    pub interfaces: Option<String>,
}

impl Default for ArpScanSection {
    fn default() -> Self {
        let arp = ArpScanConfig::default();
        Self {
            tool: arp.tool,
            retry: arp.retry,
            timeout_ms: arp.timeout_ms,
            ignore_dups: arp.ignore_dups,
            concurrency: default_scan_concurrency(),
            command_timeout_secs: arp.command_timeout_secs,
            interfaces: None,
        }
    }
}

fn default_tool() -> String {
    ArpScanConfig::default().tool
}

fn default_retry() -> u32 {
    ArpScanConfig::default().retry
}

fn default_arp_timeout_ms() -> u64 {
    ArpScanConfig::default().timeout_ms
}

fn default_command_timeout_secs() -> u64 {
    ArpScanConfig::default().command_timeout_secs
}

fn default_scan_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockSection {
    /// Include mock miners listed by the mock discovery service
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub discovery_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    /// JSON store location; in-memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Parse the boolean spellings accepted in the environment
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn env_string<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match env_string(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {raw:?} ({e})")),
        None => Ok(None),
    }
}

fn env_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match env_string(lookup, key) {
        Some(raw) => parse_bool(&raw)
            .map(Some)
            .with_context(|| format!("Invalid boolean for {key}: {raw:?}")),
        None => Ok(None),
    }
}

impl Config {
    /// Overlay environment variables, read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = env_string(&lookup, "BIND") {
            self.daemon.bind = bind;
        } else if let Some(port) = env_parse::<u16, _>(&lookup, "PORT")? {
            self.daemon.bind = format!("0.0.0.0:{port}");
        }

        if let Some(url) = env_string(&lookup, "ORACLE_URL") {
            self.oracle.base_url = Some(url);
        }
        if let Some(ms) = env_parse(&lookup, "ORACLE_TIMEOUT_MS")? {
            self.oracle.timeout_ms = ms;
        }
        if let Some(ms) = env_parse(&lookup, "ORACLE_MAX_BATCH_TIMEOUT_MS")? {
            self.oracle.max_batch_timeout_ms = ms;
        }

        if let Some(size) = env_parse(&lookup, "VALIDATION_BATCH_SIZE")? {
            self.validation.batch_size = size;
        }
        if let Some(n) = env_parse(&lookup, "VALIDATION_CONCURRENCY")? {
            self.validation.concurrency = n;
        }

        if let Some(tool) = env_string(&lookup, "ARP_SCAN_TOOL") {
            self.arp_scan.tool = tool;
        }
        if let Some(retry) = env_parse(&lookup, "ARP_SCAN_RETRY")? {
            self.arp_scan.retry = retry;
        }
        if let Some(ms) = env_parse(&lookup, "ARP_SCAN_TIMEOUT_MS")? {
            self.arp_scan.timeout_ms = ms;
        } else if let Some(ms) = env_parse(&lookup, "ARP_SCAN_TIMEOUT")? {
            self.arp_scan.timeout_ms = ms;
        }
        if let Some(ignore) = env_bool(&lookup, "ARP_SCAN_IGNORE_DUPS")? {
            self.arp_scan.ignore_dups = ignore;
        }
        if let Some(n) = env_parse(&lookup, "ARP_SCAN_CONCURRENCY")? {
            self.arp_scan.concurrency = n;
        }
        if let Some(secs) = env_parse(&lookup, "ARP_SCAN_COMMAND_TIMEOUT_SECS")? {
            self.arp_scan.command_timeout_secs = secs;
        }
        if let Some(list) = env_string(&lookup, "ARP_SCAN_INTERFACES") {
            self.arp_scan.interfaces = Some(list);
        }

        if let Some(enabled) = env_bool(&lookup, "DETECT_MOCK_DEVICES")? {
            self.mock.enabled = enabled;
        }
        if let Some(url) = env_string(&lookup, "MOCK_DISCOVERY_HOST") {
            self.mock.discovery_url = Some(url);
        }

        if let Some(path) = env_string(&lookup, "DISCOVERY_STORE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        self.daemon
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address: {}", self.daemon.bind))?;

        let base_url = self
            .oracle
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("Oracle URL is required (set oracle.base_url or ORACLE_URL)")?;
        reqwest::Url::parse(base_url).with_context(|| format!("Invalid oracle URL: {base_url}"))?;

        if self.oracle.timeout_ms == 0 {
            bail!("oracle.timeout_ms must be greater than 0");
        }
        if self.validation.batch_size == 0 {
            bail!("validation.batch_size must be greater than 0");
        }
        if self.validation.concurrency == 0 {
            bail!("validation.concurrency must be greater than 0");
        }
        if self.arp_scan.concurrency == 0 {
            bail!("arp_scan.concurrency must be greater than 0");
        }
        if self.arp_scan.command_timeout_secs == 0 {
            bail!("arp_scan.command_timeout_secs must be greater than 0");
        }
        if let Some(list) = &self.arp_scan.interfaces {
            parse_interface_list(list).context("Invalid arp_scan.interfaces")?;
        }
        if self.mock.enabled && self.mock.discovery_url.as_deref().map_or(true, str::is_empty) {
            bail!(
                "Mock detection is enabled but no mock discovery URL is set (MOCK_DISCOVERY_HOST)"
            );
        }

        Ok(())
    }

    pub fn oracle_config(&self) -> Result<OracleConfig> {
        let base_url = self
            .oracle
            .base_url
            .clone()
            .context("Oracle URL is required")?;
        Ok(OracleConfig {
            base_url,
            timeout: Duration::from_millis(self.oracle.timeout_ms),
            max_batch_timeout: Duration::from_millis(self.oracle.max_batch_timeout_ms),
        })
    }

    pub fn arp_scan_config(&self) -> ArpScanConfig {
        ArpScanConfig {
            tool: self.arp_scan.tool.clone(),
            retry: self.arp_scan.retry,
            timeout_ms: self.arp_scan.timeout_ms,
            ignore_dups: self.arp_scan.ignore_dups,
            command_timeout_secs: self.arp_scan.command_timeout_secs,
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            batch_size: self.validation.batch_size,
            validation_concurrency: self.validation.concurrency,
            scan_concurrency: self.arp_scan.concurrency,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn with_oracle() -> Config {
        let mut config = Config::default();
        config.oracle.base_url = Some("http://oracle:8000".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.daemon.bind, "0.0.0.0:3000");
        assert_eq!(config.oracle.timeout_ms, 3000);
        assert_eq!(config.oracle.max_batch_timeout_ms, 30_000);
        assert_eq!(config.validation.batch_size, 20);
        assert_eq!(config.validation.concurrency, 5);
        assert_eq!(config.arp_scan.tool, "arp-scan");
        assert_eq!(config.arp_scan.retry, 3);
        assert_eq!(config.arp_scan.timeout_ms, 2000);
        assert!(config.arp_scan.ignore_dups);
        assert_eq!(config.arp_scan.concurrency, 4);
        assert!(!config.mock.enabled);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_parse_toml_sections() {
        let config: Config = toml::from_str(
            r#"
            [oracle]
            base_url = "http://oracle:8000"
            timeout_ms = 1500

            [arp_scan]
            interfaces = "eth0,wlan0"
            ignore_dups = false

            [storage]
            path = "/var/lib/pluto/miners.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.oracle.timeout_ms, 1500);
        assert_eq!(config.oracle.max_batch_timeout_ms, 30_000);
        assert_eq!(config.arp_scan.interfaces.as_deref(), Some("eth0,wlan0"));
        assert!(!config.arp_scan.ignore_dups);
        assert_eq!(config.arp_scan.retry, 3);
        assert_eq!(config.daemon.bind, "0.0.0.0:3000");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_bool_spellings() {
        for v in ["1", "true", "YES", "y", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["0", "false", "no", "N", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("ORACLE_URL", "http://bridge:8000"),
                ("ORACLE_TIMEOUT_MS", "500"),
                ("VALIDATION_BATCH_SIZE", "10"),
                ("VALIDATION_CONCURRENCY", "2"),
                ("ARP_SCAN_RETRY", "1"),
                ("ARP_SCAN_TIMEOUT", "750"),
                ("ARP_SCAN_IGNORE_DUPS", "off"),
                ("ARP_SCAN_INTERFACES", "eth0"),
                ("DETECT_MOCK_DEVICES", "true"),
                ("MOCK_DISCOVERY_HOST", "http://mock:7000"),
                ("DISCOVERY_STORE_PATH", "/tmp/miners.json"),
                ("PORT", "4000"),
            ]))
            .unwrap();

        assert_eq!(config.oracle.base_url.as_deref(), Some("http://bridge:8000"));
        assert_eq!(config.oracle.timeout_ms, 500);
        assert_eq!(config.validation.batch_size, 10);
        assert_eq!(config.validation.concurrency, 2);
        assert_eq!(config.arp_scan.retry, 1);
        assert_eq!(config.arp_scan.timeout_ms, 750);
        assert!(!config.arp_scan.ignore_dups);
        assert_eq!(config.arp_scan.interfaces.as_deref(), Some("eth0"));
        assert!(config.mock.enabled);
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/miners.json")));
        assert_eq!(config.daemon.bind, "0.0.0.0:4000");
        config.validate().unwrap();
    }

    #[test]
    fn test_timeout_ms_wins_over_legacy_name() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("ARP_SCAN_TIMEOUT_MS", "900"), ("ARP_SCAN_TIMEOUT", "100")]))
            .unwrap();
        assert_eq!(config.arp_scan.timeout_ms, 900);
    }

    #[test]
    fn test_bind_wins_over_port() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("BIND", "127.0.0.1:8081"), ("PORT", "4000")]))
            .unwrap();
        assert_eq!(config.daemon.bind, "127.0.0.1:8081");
    }

    #[test]
    fn test_invalid_env_values_fail() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("VALIDATION_BATCH_SIZE", "many")])).is_err());
        assert!(config.apply_env(env(&[("ARP_SCAN_IGNORE_DUPS", "sometimes")])).is_err());
        assert!(config.apply_env(env(&[("PORT", "70000")])).is_err());
    }

    #[test]
    fn test_validate_requires_oracle_url() {
        assert!(Config::default().validate().is_err());
        with_oracle().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = with_oracle();
        config.validation.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = with_oracle();
        config.arp_scan.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = with_oracle();
        config.arp_scan.interfaces = Some("eth0;reboot".into());
        assert!(config.validate().is_err());

        let mut config = with_oracle();
        config.mock.enabled = true;
        assert!(config.validate().is_err());

        let mut config = with_oracle();
        config.daemon.bind = "not-an-address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_configs() {
        let mut config = with_oracle();
        config.oracle.timeout_ms = 1000;
        config.arp_scan.concurrency = 2;

        let oracle = config.oracle_config().unwrap();
        assert_eq!(oracle.timeout, Duration::from_secs(1));
        assert_eq!(oracle.max_batch_timeout, Duration::from_secs(30));

        let discovery = config.discovery_config();
        assert_eq!(discovery.batch_size, 20);
        assert_eq!(discovery.scan_concurrency, 2);

        assert_eq!(config.arp_scan_config().tool, "arp-scan");
    }
}
