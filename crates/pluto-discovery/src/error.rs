//! Error taxonomy for the discovery pipeline

use pluto_core::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid chunk size: {0} (must be greater than 0)")]
    InvalidChunkSize(usize),
    #[error("Invalid network interface name: {0}")]
    InvalidInterfaceName(String),
    #[error("Subprocess failed: {0}")]
    SubprocessFailure(String),
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),
    #[error("Mock device source unavailable: {0}")]
    MockSourceUnavailable(String),
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl DiscoveryError {
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Whether the error points at a misconfigured deployment rather than a
    /// transient condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::InvalidChunkSize(_)
                | Self::InvalidInterfaceName(_)
        )
    }
}

pub type Result<T, E = DiscoveryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_errors_are_fatal() {
        assert!(DiscoveryError::InvalidConfiguration("limit".into()).is_fatal());
        assert!(DiscoveryError::InvalidChunkSize(0).is_fatal());
        assert!(DiscoveryError::InvalidInterfaceName("eth0;ls".into()).is_fatal());

        assert!(!DiscoveryError::SubprocessFailure("boom".into()).is_fatal());
        assert!(!DiscoveryError::OracleUnavailable("down".into()).is_fatal());
        assert!(!DiscoveryError::MockSourceUnavailable("down".into()).is_fatal());
        assert!(!DiscoveryError::timeout("arp-scan", Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_timeout_message() {
        let err = DiscoveryError::timeout("arp-scan on eth0", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "arp-scan on eth0 timed out after 1.5s");
    }
}
