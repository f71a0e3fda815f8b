//! WebSocket handler for real-time updates.

use std::sync::Arc;

use aqi_types::AqiResult;
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsEvent {
    /// Sent once on connect with the most recent results, newest first.
    InitialData {
        message: &'static str,
        data: Vec<AqiResult>,
    },
    /// A freshly computed result.
    NewData { data: AqiResult },
}

impl WsEvent {
    /// Build the welcome message from the current recent results.
    pub fn initial(data: Vec<AqiResult>) -> Self {
        let message = if data.is_empty() {
            "Welcome, no data yet"
        } else {
            "Welcome"
        };
        WsEvent::InitialData { message, data }
    }
}

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so nothing published in between is missed
    let mut rx = state.results_tx.subscribe();

    info!("WebSocket client connected");

    let welcome = WsEvent::initial(state.recent(state.recent_limit()).await);
    match serde_json::to_string(&welcome) {
        Ok(json) => {
            if sender.send(Message::Text(json.into())).await.is_err() {
                info!("WebSocket client disconnected during initial snapshot");
                return;
            }
        }
        Err(e) => warn!("Failed to serialize initial snapshot: {}", e),
    }

    debug!("Sent initial snapshot to WebSocket client");

    let mut send_task = tokio::spawn(async move {
        loop {
            let result = match rx.recv().await {
                Ok(result) => result,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client fell behind, skipping results");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&WsEvent::NewData { data: result }) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain client messages; axum answers pings itself
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_core::AqiCalculator;
    use aqi_types::SensorReading;

    fn sample_result() -> AqiResult {
        let reading = SensorReading::new(28.6, 77.2).with_pollutant("O3", 100.0);
        AqiCalculator::new().calculate_final_aqi(&reading).unwrap()
    }

    #[test]
    fn test_initial_event_without_data() {
        let json = serde_json::to_value(WsEvent::initial(Vec::new())).unwrap();
        assert_eq!(json["type"], "initialData");
        assert_eq!(json["message"], "Welcome, no data yet");
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[test]
    fn test_initial_event_with_data() {
        let json = serde_json::to_value(WsEvent::initial(vec![sample_result()])).unwrap();
        assert_eq!(json["type"], "initialData");
        assert_eq!(json["message"], "Welcome");
        assert_eq!(json["data"][0]["locationKey"], "28.6,77.2");
    }

    #[test]
    fn test_new_data_event() {
        let json = serde_json::to_value(WsEvent::NewData {
            data: sample_result(),
        })
        .unwrap();
        assert_eq!(json["type"], "newData");
        assert_eq!(json["data"]["AQI"], 100.0);
        assert_eq!(json["data"]["pollutant"], "O3");
    }
}
