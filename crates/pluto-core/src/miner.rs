//! Miner types produced and persisted by the discovery pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// One host reported by an ARP scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanHit {
    pub ip: String,
    /// Lowercase, colon-separated MAC address
    pub mac: String,
    /// Vendor string from the scanner, or a known device type for synthetic hits
    #[serde(rename = "type")]
    pub vendor_or_type: String,
}

impl ScanHit {
    pub fn new(
        ip: impl Into<String>,
        mac: impl Into<String>,
        vendor_or_type: impl Into<String>,
    ) -> Self {
        Self {
            ip: ip.into(),
            mac: mac.into().to_lowercase(),
            vendor_or_type: vendor_or_type.into(),
        }
    }
}

/// Oracle classification of a single IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ip: String,
    #[serde(default)]
    pub is_miner: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Per-IP failure reported by the oracle (never fatal for the batch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn miner(ip: impl Into<String>, model: Option<&str>) -> Self {
        Self {
            ip: ip.into(),
            is_miner: true,
            model: model.map(str::to_string),
            error: None,
        }
    }

    pub fn not_miner(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            is_miner: false,
            model: None,
            error: None,
        }
    }
}

/// Normalized telemetry for one miner, as returned by the oracle.
///
/// The payload is kept opaque so that it works across manufacturers; only a
/// handful of well-known fields are read back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinerData(Value);

impl MinerData {
    /// Accept an oracle payload only if it is an object carrying a string `ip`
    pub fn from_value(value: Value) -> Option<Self> {
        match value.get("ip") {
            Some(Value::String(_)) => Some(Self(value)),
            _ => None,
        }
    }

    /// Build placeholder data when the oracle had nothing richer to offer
    pub fn minimal(ip: &str, mac: Option<&str>, model: Option<&str>) -> Self {
        let mut map = Map::new();
        map.insert("ip".to_string(), json!(ip));
        if let Some(mac) = mac.filter(|m| *m != "unknown") {
            map.insert("mac".to_string(), json!(mac));
        }
        map.insert("hostname".to_string(), json!(ip));
        if let Some(model) = model.filter(|m| *m != "unknown") {
            map.insert("model".to_string(), json!(model));
            map.insert("device_info".to_string(), json!({ "model": model }));
        }
        Self(Value::Object(map))
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn ip(&self) -> Option<&str> {
        self.str_field("ip")
    }

    pub fn mac(&self) -> Option<&str> {
        self.str_field("mac")
    }

    pub fn hostname(&self) -> Option<&str> {
        self.str_field("hostname")
    }

    /// Model name, preferring `device_info.model` over the top-level field
    pub fn model(&self) -> Option<&str> {
        self.0
            .get("device_info")
            .and_then(|info| info.get("model"))
            .and_then(Value::as_str)
            .or_else(|| self.str_field("model"))
    }
}

/// A validated miner, keyed by MAC in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredMiner {
    /// Assigned on first discovery and never changed afterwards
    pub id: Uuid,
    /// Address the scan saw the miner at
    pub ip: String,
    pub mac: String,
    /// Model name, or scanner vendor string when the model is unknown
    #[serde(rename = "type")]
    pub miner_type: String,
    pub miner_data: MinerData,
    /// Set when the scan-visible address differs from the miner's self-reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_ip: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DiscoveredMiner {
    pub fn new(
        ip: impl Into<String>,
        mac: impl Into<String>,
        miner_type: impl Into<String>,
        miner_data: MinerData,
    ) -> Self {
        let ip = ip.into();
        let storage_ip = match miner_data.ip() {
            Some(reported) if reported != ip => Some(ip.clone()),
            _ => None,
        };
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ip,
            mac: mac.into().to_lowercase(),
            miner_type: miner_type.into(),
            miner_data,
            storage_ip,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Fold a fresh observation of the same MAC into this record.
    /// `id` and `first_seen` are preserved.
    pub fn absorb(&mut self, fresh: DiscoveredMiner) {
        self.ip = fresh.ip;
        self.miner_type = fresh.miner_type;
        self.miner_data = fresh.miner_data;
        self.storage_ip = fresh.storage_ip;
        self.last_seen = fresh.last_seen;
    }

    /// Address to use when reconnecting to the miner
    pub fn reconnect_ip(&self) -> &str {
        self.storage_ip.as_deref().unwrap_or(&self.ip)
    }

    pub fn hostname(&self) -> Option<&str> {
        self.miner_data.hostname()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_hit_lowercases_mac() {
        let hit = ScanHit::new("192.168.1.10", "AA:BB:CC:DD:EE:FF", "Espressif Inc.");
        assert_eq!(hit.mac, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_miner_data_requires_string_ip() {
        assert!(MinerData::from_value(json!({ "ip": "10.0.0.5", "model": "S19" })).is_some());
        assert!(MinerData::from_value(json!({ "ip": 42 })).is_none());
        assert!(MinerData::from_value(json!({ "hostname": "bitaxe" })).is_none());
        assert!(MinerData::from_value(json!(["10.0.0.5"])).is_none());
        assert!(MinerData::from_value(Value::Null).is_none());
    }

    #[test]
    fn test_model_prefers_device_info() {
        let data = MinerData::from_value(json!({
            "ip": "10.0.0.5",
            "model": "top-level",
            "device_info": { "model": "BM1366" }
        }))
        .unwrap();
        assert_eq!(data.model(), Some("BM1366"));

        let data = MinerData::from_value(json!({ "ip": "10.0.0.5", "model": "S9" })).unwrap();
        assert_eq!(data.model(), Some("S9"));
    }

    #[test]
    fn test_minimal_data_skips_unknown_values() {
        let data = MinerData::minimal("10.0.0.5", Some("unknown"), Some("unknown"));
        assert_eq!(data.ip(), Some("10.0.0.5"));
        assert_eq!(data.hostname(), Some("10.0.0.5"));
        assert_eq!(data.mac(), None);
        assert_eq!(data.model(), None);

        let data = MinerData::minimal("10.0.0.5", Some("aa:bb:cc:dd:ee:ff"), Some("Gamma"));
        assert_eq!(data.mac(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(data.model(), Some("Gamma"));
    }

    #[test]
    fn test_storage_ip_set_only_when_addresses_diverge() {
        let same = DiscoveredMiner::new(
            "10.0.0.5",
            "aa:bb:cc:dd:ee:ff",
            "S19",
            MinerData::minimal("10.0.0.5", None, None),
        );
        assert_eq!(same.storage_ip, None);
        assert_eq!(same.reconnect_ip(), "10.0.0.5");

        let bridged = DiscoveredMiner::new(
            "localhost:9001",
            "ff:ff:ff:ff:23:29",
            "mock",
            MinerData::minimal("172.17.0.3", None, None),
        );
        assert_eq!(bridged.storage_ip.as_deref(), Some("localhost:9001"));
        assert_eq!(bridged.reconnect_ip(), "localhost:9001");
    }

    #[test]
    fn test_absorb_keeps_identity() {
        let mut stored = DiscoveredMiner::new(
            "10.0.0.5",
            "aa:bb:cc:dd:ee:ff",
            "old",
            MinerData::minimal("10.0.0.5", None, None),
        );
        let id = stored.id;
        let first_seen = stored.first_seen;

        let fresh = DiscoveredMiner::new(
            "10.0.0.9",
            "aa:bb:cc:dd:ee:ff",
            "new",
            MinerData::minimal("10.0.0.9", None, None),
        );
        stored.absorb(fresh);

        assert_eq!(stored.id, id);
        assert_eq!(stored.first_seen, first_seen);
        assert_eq!(stored.ip, "10.0.0.9");
        assert_eq!(stored.miner_type, "new");
    }

    #[test]
    fn test_serializes_camel_case() {
        let miner = DiscoveredMiner::new(
            "localhost:9001",
            "ff:ff:ff:ff:23:29",
            "mock",
            MinerData::minimal("172.17.0.3", None, None),
        );
        let value = serde_json::to_value(&miner).unwrap();
        assert!(value.get("minerData").is_some());
        assert_eq!(value["storageIp"], "localhost:9001");
        assert_eq!(value["type"], "mock");
        assert!(value.get("firstSeen").is_some());
    }
}
