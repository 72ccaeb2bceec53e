//! Pluto Core - Miner records and their persistence
//!
//! This crate provides the foundational types for the discovery pipeline:
//! - Scan hits, oracle validation results and normalized miner telemetry
//! - The canonical `DiscoveredMiner` record
//! - The `MinerStore` trait with in-memory and JSON-file implementations

pub mod miner;
pub mod store;

pub use miner::{DiscoveredMiner, MinerData, ScanHit, ValidationResult};
pub use store::{JsonFileStore, MemoryMinerStore, MinerStore, StoreError};
