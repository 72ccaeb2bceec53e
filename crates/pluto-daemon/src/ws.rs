//! WebSocket handler for real-time discovery updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use pluto_core::DiscoveredMiner;
use pluto_discovery::{DeviceQuery, DiscoveryEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "miner_discovered")]
    MinerDiscovered(DiscoveredMiner),
    #[serde(rename = "miner_updated")]
    MinerUpdated(DiscoveredMiner),
    #[serde(rename = "scan_started")]
    ScanStarted { run_id: String },
    #[serde(rename = "scan_completed")]
    ScanCompleted {
        run_id: String,
        found: usize,
        total: usize,
    },
    #[serde(rename = "pong")]
    Pong,
}

impl From<DiscoveryEvent> for WsMessage {
    fn from(event: DiscoveryEvent) -> Self {
        match event {
            DiscoveryEvent::MinerDiscovered(miner) => WsMessage::MinerDiscovered(miner),
            DiscoveryEvent::MinerUpdated(miner) => WsMessage::MinerUpdated(miner),
            DiscoveryEvent::ScanStarted { run_id } => WsMessage::ScanStarted {
                run_id: run_id.to_string(),
            },
            DiscoveryEvent::ScanCompleted {
                run_id,
                found,
                total,
            } => WsMessage::ScanCompleted {
                run_id: run_id.to_string(),
                found,
                total,
            },
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &WsMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut discovery_events = state.subscribe();

    info!("WebSocket client connected");

    // Send known miners on connect
    match state
        .orchestrator
        .get_discovered_devices(&DeviceQuery::default())
        .await
    {
        Ok(miners) => {
            for miner in miners {
                if !send(&mut sender, &WsMessage::MinerDiscovered(miner)).await {
                    return;
                }
            }
        }
        Err(e) => warn!(error = %e, "Failed to load stored miners for WebSocket client"),
    }

    loop {
        tokio::select! {
            event = discovery_events.recv() => {
                match event {
                    Ok(event) => {
                        if !send(&mut sender, &WsMessage::from(event)).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Discovery event channel lagged");
                    }
                    Err(e) => {
                        debug!(error = %e, "Discovery event channel error");
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" && !send(&mut sender, &WsMessage::Pong).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
