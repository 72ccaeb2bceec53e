//! REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pluto_discovery::{DeviceQuery, DiscoveryFilter, MatchMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::parse_bool;
use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn bad_request(msg: impl Into<String>) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ApiError::new(msg))).into_response()
}

fn internal_error(msg: impl Into<String>) -> axum::response::Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiError::new(msg))).into_response()
}

/// `/discover` query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverParams {
    ip: Option<String>,
    mac: Option<String>,
    partial_match: Option<String>,
}

/// Run a discovery pass and return the miners it found
pub async fn discover(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiscoverParams>,
) -> impl IntoResponse {
    let partial_match = match params.partial_match.as_deref().filter(|v| !v.is_empty()) {
        Some(raw) => match parse_bool(raw) {
            Some(value) => value,
            None => return bad_request(format!("Invalid partialMatch value: {raw}")),
        },
        None => false,
    };

    let filter = DiscoveryFilter {
        ip: params.ip.filter(|v| !v.is_empty()),
        mac: params.mac.filter(|v| !v.is_empty()),
        partial_match,
    };
    info!(filter = ?filter, "Discovery requested");

    match state.orchestrator.discover(&filter).await {
        Ok(report) => Json(report.miners).into_response(),
        Err(e) => {
            error!(error = %e, "Discovery request failed");
            internal_error("Failed to discover devices")
        }
    }
}

/// `/discovered` query string: comma-separated lists plus per-list match modes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredParams {
    macs: Option<String>,
    ips: Option<String>,
    hostnames: Option<String>,
    partial_macs: Option<String>,
    partial_ips: Option<String>,
    partial_hostnames: Option<String>,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn match_mode(value: Option<&str>) -> Result<MatchMode, String> {
    match value.filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map_err(|_| format!("Invalid match mode: {raw}")),
        None => Ok(MatchMode::default()),
    }
}

impl DiscoveredParams {
    fn into_query(self) -> Result<DeviceQuery, String> {
        Ok(DeviceQuery {
            macs: split_list(self.macs.as_deref()),
            ips: split_list(self.ips.as_deref()),
            hostnames: split_list(self.hostnames.as_deref()),
            mac_mode: match_mode(self.partial_macs.as_deref())?,
            ip_mode: match_mode(self.partial_ips.as_deref())?,
            hostname_mode: match_mode(self.partial_hostnames.as_deref())?,
        })
    }
}

/// Stored miners matching the query
pub async fn list_discovered(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiscoveredParams>,
) -> impl IntoResponse {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(msg) => return bad_request(msg),
    };

    match state.orchestrator.get_discovered_devices(&query).await {
        Ok(miners) => Json(miners).into_response(),
        Err(e) => {
            error!(error = %e, "Discovered device lookup failed");
            internal_error("Discovery service failed")
        }
    }
}

/// One stored miner by MAC
pub async fn get_discovered(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.lookup_discovered_device(&mac).await {
        Ok(Some(miner)) => Json(miner).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(ApiError::new("Miner not found"))).into_response(),
        Err(e) => {
            error!(mac = %mac, error = %e, "Discovered device lookup failed");
            internal_error("Discovery service failed")
        }
    }
}

/// Interfaces the next discovery run would scan
pub async fn list_interfaces(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.orchestrator.interfaces().enumerate().await {
        Ok(interfaces) => Json(interfaces).into_response(),
        Err(e) => internal_error(format!("Failed to list interfaces: {e}")),
    }
}
