//! Filters over stored miner records

use pluto_core::DiscoveredMiner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DiscoveryError;

/// How a query item is compared against a stored value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Whole value equals the item
    #[serde(alias = "none")]
    Exact,
    /// Value starts with the item
    #[serde(alias = "right")]
    Prefix,
    /// Value ends with the item
    #[serde(alias = "left")]
    Suffix,
    /// Value contains the item
    #[default]
    Both,
}

impl MatchMode {
    pub fn matches(self, value: &str, item: &str) -> bool {
        match self {
            MatchMode::Exact => value == item,
            MatchMode::Prefix => value.starts_with(item),
            MatchMode::Suffix => value.ends_with(item),
            MatchMode::Both => value.contains(item),
        }
    }
}

impl FromStr for MatchMode {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" | "none" => Ok(MatchMode::Exact),
            "prefix" | "right" => Ok(MatchMode::Prefix),
            "suffix" | "left" => Ok(MatchMode::Suffix),
            "both" => Ok(MatchMode::Both),
            other => Err(DiscoveryError::InvalidConfiguration(format!(
                "Unknown match mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchMode::Exact => "exact",
            MatchMode::Prefix => "prefix",
            MatchMode::Suffix => "suffix",
            MatchMode::Both => "both",
        };
        f.write_str(s)
    }
}

/// Multi-field lookup over stored miners.
///
/// Each non-empty list must be satisfied by at least one of its items; empty
/// lists don't filter at all. MACs compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceQuery {
    pub macs: Vec<String>,
    pub ips: Vec<String>,
    pub hostnames: Vec<String>,
    pub mac_mode: MatchMode,
    pub ip_mode: MatchMode,
    pub hostname_mode: MatchMode,
}

impl DeviceQuery {
    pub fn is_empty(&self) -> bool {
        self.macs.is_empty() && self.ips.is_empty() && self.hostnames.is_empty()
    }

    pub fn matches(&self, miner: &DiscoveredMiner) -> bool {
        let mac = miner.mac.to_lowercase();
        let mac_ok = self.macs.is_empty()
            || self
                .macs
                .iter()
                .any(|item| self.mac_mode.matches(&mac, &item.to_lowercase()));

        let ip_ok = self.ips.is_empty()
            || self.ips.iter().any(|item| self.ip_mode.matches(&miner.ip, item));

        let hostname_ok = self.hostnames.is_empty()
            || miner.hostname().is_some_and(|hostname| {
                self.hostnames
                    .iter()
                    .any(|item| self.hostname_mode.matches(hostname, item))
            });

        mac_ok && ip_ok && hostname_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_core::MinerData;
    use serde_json::json;

    fn miner(ip: &str, mac: &str, hostname: &str) -> DiscoveredMiner {
        let data = MinerData::from_value(json!({ "ip": ip, "hostname": hostname })).unwrap();
        DiscoveredMiner::new(ip, mac, "S19", data)
    }

    #[test]
    fn test_parse_match_mode_aliases() {
        assert_eq!("none".parse::<MatchMode>().unwrap(), MatchMode::Exact);
        assert_eq!("exact".parse::<MatchMode>().unwrap(), MatchMode::Exact);
        assert_eq!("right".parse::<MatchMode>().unwrap(), MatchMode::Prefix);
        assert_eq!("left".parse::<MatchMode>().unwrap(), MatchMode::Suffix);
        assert_eq!("BOTH".parse::<MatchMode>().unwrap(), MatchMode::Both);
        assert!("sideways".parse::<MatchMode>().is_err());
        assert_eq!(MatchMode::default(), MatchMode::Both);
    }

    #[test]
    fn test_match_mode_deserializes_aliases() {
        let mode: MatchMode = serde_json::from_value(json!("left")).unwrap();
        assert_eq!(mode, MatchMode::Suffix);
        let mode: MatchMode = serde_json::from_value(json!("prefix")).unwrap();
        assert_eq!(mode, MatchMode::Prefix);
    }

    #[test]
    fn test_modes() {
        let m = miner("192.168.1.10", "aa:bb:cc:dd:ee:ff", "bitaxe-01");

        let exact = DeviceQuery {
            ips: vec!["192.168.1.10".into()],
            ip_mode: MatchMode::Exact,
            ..Default::default()
        };
        assert!(exact.matches(&m));

        let exact_miss = DeviceQuery {
            ips: vec!["192.168.1.1".into()],
            ip_mode: MatchMode::Exact,
            ..Default::default()
        };
        assert!(!exact_miss.matches(&m));

        let prefix = DeviceQuery {
            hostnames: vec!["bitaxe".into()],
            hostname_mode: MatchMode::Prefix,
            ..Default::default()
        };
        assert!(prefix.matches(&m));

        let suffix = DeviceQuery {
            hostnames: vec!["bitaxe".into()],
            hostname_mode: MatchMode::Suffix,
            ..Default::default()
        };
        assert!(!suffix.matches(&m));

        let both = DeviceQuery {
            macs: vec!["CC:DD".into()],
            ..Default::default()
        };
        assert!(both.matches(&m));
    }

    #[test]
    fn test_union_within_and_across_dimensions() {
        let m = miner("192.168.1.10", "aa:bb:cc:dd:ee:ff", "bitaxe-01");

        let union = DeviceQuery {
            ips: vec!["10.0.0.".into(), "192.168.1.".into()],
            ..Default::default()
        };
        assert!(union.matches(&m));

        let across = DeviceQuery {
            ips: vec!["192.168.1.".into()],
            macs: vec!["11:22".into()],
            ..Default::default()
        };
        assert!(!across.matches(&m));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let query = DeviceQuery::default();
        assert!(query.is_empty());
        assert!(query.matches(&miner("10.0.0.5", "aa:bb:cc:dd:ee:ff", "x")));
    }
}
