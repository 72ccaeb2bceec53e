//! Network interface enumeration
//!
//! Interface names end up on the `arp-scan` command line, so every name that
//! reaches a subprocess is checked against a strict character set first.

use std::io::ErrorKind;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, Result};

/// Virtual, loopback and container interfaces that are never scanned
const EXCLUDED_PREFIXES: &[&str] = &["docker", "br-", "veth", "lo", "dind", ".orbmirror"];

/// Default deadline for the interface query subprocess
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Check a name against the safe pattern: ASCII alphanumerics, `.`, `_`, `-`
pub fn is_valid_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

pub fn validate_interface_name(name: &str) -> Result<&str> {
    if is_valid_interface_name(name) {
        Ok(name)
    } else {
        Err(DiscoveryError::InvalidInterfaceName(name.to_string()))
    }
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// OS-reported names that can be handed to a scan
fn is_scannable(name: &str) -> bool {
    if is_excluded(name) {
        return false;
    }
    if !is_valid_interface_name(name) {
        warn!(interface = %name, "Skipping interface with unsupported name");
        return false;
    }
    true
}

/// Parse an operator-supplied comma-separated list.
///
/// Blank entries and repeats are dropped; any invalid name fails the whole list.
pub fn parse_interface_list(value: &str) -> Result<Vec<String>> {
    let mut interfaces: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        validate_interface_name(item)?;
        if !interfaces.iter().any(|existing| existing == item) {
            interfaces.push(item.to_string());
        }
    }
    Ok(interfaces)
}

/// Parse newline-delimited interface names.
///
/// Accepts either bare names or `ip -o addr show` records
/// (`2: eth0    inet 192.168.1.5/24 ...`), from which the device field is taken.
pub fn parse_interface_names(output: &str) -> Vec<String> {
    let mut names: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let first = fields.next()?;
            let is_record = first
                .strip_suffix(':')
                .is_some_and(|idx| !idx.is_empty() && idx.chars().all(|c| c.is_ascii_digit()));
            let name = if is_record { fields.next()? } else { first };
            let name = name.split('@').next().unwrap_or(name).trim_end_matches(':');
            Some(name.to_string())
        })
        .filter(|name| is_scannable(name))
        .collect();

    names.sort();
    names.dedup();
    names
}

/// Produces the list of interfaces a discovery run should scan
#[derive(Debug, Clone)]
pub struct InterfaceEnumerator {
    override_list: Option<String>,
}

impl InterfaceEnumerator {
    pub fn new(override_list: Option<String>) -> Self {
        Self { override_list }
    }

    pub fn override_list(&self) -> Option<&str> {
        self.override_list.as_deref()
    }

    /// Return the configured interfaces, or ask the OS for active ones
    pub async fn enumerate(&self) -> Result<Vec<String>> {
        if let Some(list) = self.override_list().filter(|l| !l.trim().is_empty()) {
            let interfaces = parse_interface_list(list)?;
            if !interfaces.is_empty() {
                debug!(interfaces = ?interfaces, "Using configured interfaces");
                return Ok(interfaces);
            }
        }

        let interfaces = query_os_interfaces(DEFAULT_QUERY_TIMEOUT).await?;
        info!(interfaces = ?interfaces, "Found active network interfaces");
        Ok(interfaces)
    }
}

/// IPv4-capable interfaces as reported by `ip -o -4 addr show`
async fn query_os_interfaces(query_timeout: Duration) -> Result<Vec<String>> {
    let run = Command::new("ip")
        .args(["-o", "-4", "addr", "show"])
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(query_timeout, run).await {
        Err(_) => return Err(DiscoveryError::timeout("ip addr show", query_timeout)),
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            warn!("`ip` utility not found, falling back to system interface list");
            return list_system_interfaces();
        }
        Ok(Err(e)) => {
            return Err(DiscoveryError::SubprocessFailure(format!(
                "failed to run ip: {e}"
            )))
        }
        Ok(Ok(output)) => output,
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(DiscoveryError::SubprocessFailure(format!(
            "ip exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    if !stderr.trim().is_empty() {
        return Err(DiscoveryError::SubprocessFailure(stderr.trim().to_string()));
    }

    Ok(parse_interface_names(&String::from_utf8_lossy(&output.stdout)))
}

fn list_system_interfaces() -> Result<Vec<String>> {
    use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};

    let interfaces = NetworkInterface::show().map_err(|e| {
        DiscoveryError::SubprocessFailure(format!("failed to list network interfaces: {e}"))
    })?;

    let mut names: Vec<String> = interfaces
        .into_iter()
        .filter(|iface| iface.addr.iter().any(|addr| matches!(addr, Addr::V4(_))))
        .map(|iface| iface.name)
        .filter(|name| is_scannable(name))
        .collect();

    names.sort();
    names.dedup();
    Ok(names)
}
