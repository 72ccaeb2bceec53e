//! Candidate helpers: batching, MAC dedupe and mock-device identities
//!
//! Mock devices use the reserved MAC family `ff:ff:ff:ff:XX:XX`, which real
//! NICs never carry, with the last two octets encoding the mock server's port.

use pluto_core::ScanHit;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{DiscoveryError, Result};

/// Prefix shared by every synthetic MAC
pub const MOCK_MAC_PREFIX: &str = "ff:ff:ff:ff:";

/// Split `items` into consecutive chunks of at most `size` elements
pub fn chunk_array<T: Clone>(items: &[T], size: usize) -> Result<Vec<Vec<T>>> {
    if size == 0 {
        return Err(DiscoveryError::InvalidChunkSize(size));
    }
    Ok(items.chunks(size).map(<[T]>::to_vec).collect())
}

/// Values that may name a TCP port
pub trait PortLike {
    /// The port, if this is an integer in `1..=65535`
    fn to_port(&self) -> Option<u16>;
}

fn port_from_i64(value: i64) -> Option<u16> {
    u16::try_from(value).ok().filter(|p| *p > 0)
}

impl PortLike for u16 {
    fn to_port(&self) -> Option<u16> {
        Some(*self).filter(|p| *p > 0)
    }
}

impl PortLike for u32 {
    fn to_port(&self) -> Option<u16> {
        port_from_i64(i64::from(*self))
    }
}

impl PortLike for i32 {
    fn to_port(&self) -> Option<u16> {
        port_from_i64(i64::from(*self))
    }
}

impl PortLike for i64 {
    fn to_port(&self) -> Option<u16> {
        port_from_i64(*self)
    }
}

impl PortLike for u64 {
    fn to_port(&self) -> Option<u16> {
        i64::try_from(*self).ok().and_then(port_from_i64)
    }
}

impl PortLike for f64 {
    fn to_port(&self) -> Option<u16> {
        if !self.is_finite() || self.fract() != 0.0 {
            return None;
        }
        if *self < 1.0 || *self > f64::from(u16::MAX) {
            return None;
        }
        Some(*self as u16)
    }
}

impl PortLike for &str {
    fn to_port(&self) -> Option<u16> {
        let trimmed = self.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return port_from_i64(n);
        }
        trimmed.parse::<f64>().ok().and_then(|f| f.to_port())
    }
}

impl PortLike for String {
    fn to_port(&self) -> Option<u16> {
        self.as_str().to_port()
    }
}

impl PortLike for Value {
    fn to_port(&self) -> Option<u16> {
        match self {
            Value::Number(n) => n
                .as_i64()
                .and_then(port_from_i64)
                .or_else(|| n.as_f64().and_then(|f| f.to_port())),
            Value::String(s) => s.as_str().to_port(),
            _ => None,
        }
    }
}

/// Deterministic synthetic MAC for a mock device listening on `port`
pub fn mock_mac_from_port(port: impl PortLike) -> Option<String> {
    let port = port.to_port()?;
    let [hi, lo] = port.to_be_bytes();
    Some(format!("{MOCK_MAC_PREFIX}{hi:02x}:{lo:02x}"))
}

/// Whether `mac` belongs to the reserved mock-device family
pub fn is_mock_device(mac: &str) -> bool {
    mac.len() >= MOCK_MAC_PREFIX.len()
        && mac.is_char_boundary(MOCK_MAC_PREFIX.len())
        && mac[..MOCK_MAC_PREFIX.len()].eq_ignore_ascii_case(MOCK_MAC_PREFIX)
}

/// Like [`is_mock_device`], but false for anything that isn't a JSON string
pub fn is_mock_value(mac: &Value) -> bool {
    mac.as_str().is_some_and(is_mock_device)
}

/// Collapse hits that share a MAC. The last observation wins; output keeps
/// the order in which each MAC was first seen.
pub fn dedupe_by_mac(hits: Vec<ScanHit>) -> Vec<ScanHit> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ScanHit> = Vec::with_capacity(hits.len());

    for hit in hits {
        let key = hit.mac.to_lowercase();
        match index.get(&key) {
            Some(&pos) => unique[pos] = hit,
            None => {
                index.insert(key, unique.len());
                unique.push(hit);
            }
        }
    }

    unique
}

/// Split candidates into (real, mock)
pub fn partition_mock(hits: Vec<ScanHit>) -> (Vec<ScanHit>, Vec<ScanHit>) {
    hits.into_iter().partition(|hit| !is_mock_device(&hit.mac))
}
