//! ARP scanning through the external `arp-scan` utility

use async_trait::async_trait;
use pluto_core::ScanHit;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{DiscoveryError, Result};
use crate::interfaces::validate_interface_name;

/// arp-scan invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArpScanConfig {
    /// Program to run
    pub tool: String,
    /// Per-host retry count (`--retry`)
    pub retry: u32,
    /// Per-host timeout in milliseconds (`--timeout`)
    pub timeout_ms: u64,
    /// Pass `--ignoredups`
    pub ignore_dups: bool,
    /// Deadline for the whole subprocess, in seconds
    pub command_timeout_secs: u64,
}

impl Default for ArpScanConfig {
    fn default() -> Self {
        Self {
            tool: "arp-scan".to_string(),
            retry: 3,
            timeout_ms: 2000,
            ignore_dups: true,
            command_timeout_secs: 60,
        }
    }
}

/// Something that can list the hosts answering on one interface
#[async_trait]
pub trait HostScanner: Send + Sync {
    async fn scan(&self, interface: &str) -> Result<Vec<ScanHit>>;
}

/// Runs `arp-scan` as a subprocess, one interface at a time
#[derive(Debug, Clone, Default)]
pub struct ArpScanner {
    config: ArpScanConfig,
}

impl ArpScanner {
    pub fn new(config: ArpScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArpScanConfig {
        &self.config
    }

    /// Argument vector for scanning `interface`.
    ///
    /// The name is validated first; arguments are handed to the OS as-is
    /// with no shell in between.
    pub fn build_args(&self, interface: &str) -> Result<Vec<String>> {
        let interface = validate_interface_name(interface)?;

        let mut args = vec![
            format!("--interface={interface}"),
            "--localnet".to_string(),
            format!("--retry={}", self.config.retry),
            format!("--timeout={}", self.config.timeout_ms),
        ];
        if self.config.ignore_dups {
            args.push("--ignoredups".to_string());
        }
        Ok(args)
    }
}

#[async_trait]
impl HostScanner for ArpScanner {
    async fn scan(&self, interface: &str) -> Result<Vec<ScanHit>> {
        let args = self.build_args(interface)?;
        let deadline = Duration::from_secs(self.config.command_timeout_secs);

        debug!(interface = %interface, tool = %self.config.tool, args = ?args, "Running ARP scan");

        let run = Command::new(&self.config.tool)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(deadline, run).await {
            Err(_) => {
                return Err(DiscoveryError::timeout(
                    format!("{} on {}", self.config.tool, interface),
                    deadline,
                ))
            }
            Ok(Err(e)) => {
                return Err(DiscoveryError::SubprocessFailure(format!(
                    "failed to run {}: {e}",
                    self.config.tool
                )))
            }
            Ok(Ok(output)) => output,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(DiscoveryError::SubprocessFailure(format!(
                "{} exited with {}: {}",
                self.config.tool,
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            return Err(DiscoveryError::SubprocessFailure(stderr.trim().to_string()));
        }

        let hits = parse_arp_scan_output(&String::from_utf8_lossy(&output.stdout));
        debug!(interface = %interface, hosts = hits.len(), "ARP scan finished");
        Ok(hits)
    }
}

/// Parse arp-scan output into hits, skipping banners and summaries
pub fn parse_arp_scan_output(output: &str) -> Vec<ScanHit> {
    output.lines().filter_map(parse_arp_scan_line).collect()
}

/// Parse one `ip <TAB> mac <TAB> vendor` line
fn parse_arp_scan_line(line: &str) -> Option<ScanHit> {
    let line = line.trim_end();
    let (ip, rest) = line.split_once(char::is_whitespace)?;
    let (mac, vendor) = rest.trim_start().split_once(char::is_whitespace)?;
    let vendor = vendor.trim();

    Ipv4Addr::from_str(ip).ok()?;
    if !is_mac_like(mac) || vendor.is_empty() {
        trace!(line = %line, "Skipping non-host line");
        return None;
    }

    Some(ScanHit::new(ip, mac, vendor))
}

fn is_mac_like(s: &str) -> bool {
    let octets: Vec<&str> = s.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| (1..=2).contains(&o.len()) && o.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = "\
Interface: eth0, type: EN10MB, MAC: 00:11:22:33:44:55, IPv4: 192.168.1.2
Starting arp-scan 1.10.0 with 256 hosts (https://github.com/royhills/arp-scan)
192.168.1.10\t24:0a:c4:12:34:56\tEspressif Inc.
192.168.1.11\t00:1A:2B:3C:4D:5E\t(Unknown)
192.168.1.12\t00:1a:2b:3c:4d:60\tBitmain Technologies Inc. (DUP: 2)

3 packets received by filter, 0 packets dropped by kernel
Ending arp-scan 1.10.0: 256 hosts scanned in 1.958 seconds (130.74 hosts/sec). 3 responded
";

    fn scanner_with_tool(tool: &str) -> ArpScanner {
        ArpScanner::new(ArpScanConfig {
            tool: tool.to_string(),
            ..ArpScanConfig::default()
        })
    }

    #[test]
    fn test_parse_arp_scan_output() {
        let hits = parse_arp_scan_output(SAMPLE_OUTPUT);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], ScanHit::new("192.168.1.10", "24:0a:c4:12:34:56", "Espressif Inc."));
        assert_eq!(hits[1].mac, "00:1a:2b:3c:4d:5e");
        assert_eq!(hits[1].vendor_or_type, "(Unknown)");
        assert_eq!(hits[2].vendor_or_type, "Bitmain Technologies Inc. (DUP: 2)");
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let output = "192.168.1.10\tnot-a-mac\tVendor\n\
                      999.1.1.1\t00:11:22:33:44:55\tVendor\n\
                      192.168.1.10\t00:11:22:33:44:55\n\
                      \n";
        assert!(parse_arp_scan_output(output).is_empty());
    }

    #[test]
    fn test_build_args() {
        let scanner = ArpScanner::default();
        assert_eq!(
            scanner.build_args("eth0").unwrap(),
            vec![
                "--interface=eth0",
                "--localnet",
                "--retry=3",
                "--timeout=2000",
                "--ignoredups"
            ]
        );

        let scanner = ArpScanner::new(ArpScanConfig {
            retry: 1,
            timeout_ms: 500,
            ignore_dups: false,
            ..ArpScanConfig::default()
        });
        assert_eq!(
            scanner.build_args("wlan0").unwrap(),
            vec!["--interface=wlan0", "--localnet", "--retry=1", "--timeout=500"]
        );
    }

    #[tokio::test]
    async fn test_scan_rejects_injection_before_spawning() {
        // A missing tool would surface as SubprocessFailure if a spawn were attempted
        let scanner = scanner_with_tool("/nonexistent/arp-scan");
        let err = scanner.scan("eth0;rm -rf /").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidInterfaceName(_)));
    }

    #[tokio::test]
    async fn test_scan_reports_missing_tool() {
        let scanner = scanner_with_tool("/nonexistent/arp-scan");
        let err = scanner.scan("eth0").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::SubprocessFailure(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_reports_abnormal_exit() {
        let scanner = scanner_with_tool("false");
        let err = scanner.scan("eth0").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::SubprocessFailure(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_passes_arguments_verbatim() {
        // `echo` prints its argv, which contains no host lines
        let scanner = scanner_with_tool("echo");
        let hits = scanner.scan("eth0").await.unwrap();
        assert!(hits.is_empty());
    }

    /// Write an executable shell script standing in for the scan tool
    #[cfg(unix)]
    fn fake_tool(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("arp-scan");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_fails_on_stderr_despite_success() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            &dir,
            "printf '192.168.1.10\\taa:bb:cc:dd:ee:01\\tEspressif Inc.\\n'\n\
             echo 'WARNING: oops' >&2\n\
             exit 0",
        );
        let scanner = scanner_with_tool(&tool);

        match scanner.scan("eth0").await {
            Err(DiscoveryError::SubprocessFailure(msg)) => assert!(msg.contains("WARNING: oops")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "exec sleep 5");
        let scanner = ArpScanner::new(ArpScanConfig {
            tool,
            command_timeout_secs: 1,
            ..ArpScanConfig::default()
        });

        let err = scanner.scan("eth0").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout { .. }), "unexpected error: {err:?}");
    }
}
