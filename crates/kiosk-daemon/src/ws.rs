//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use kiosk_core::topics;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{AppState, BusEvent};

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Events a client sees right after connecting, so it can render without
/// waiting for the next change
fn snapshot(state: &AppState) -> Vec<BusEvent> {
    let mut events = vec![BusEvent {
        topic: topics::SLIDE_CHANGE.to_string(),
        payload: json!({ "slide_id": state.current_slide() }),
    }];
    for device in state.devices() {
        events.push(BusEvent {
            topic: topics::CLIENTS_UPDATED.to_string(),
            payload: json!({ "device": device.kind, "client_count": device.client_count }),
        });
    }
    events
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.subscribe();

    info!("WebSocket client connected");

    for event in snapshot(&state) {
        if let Ok(text) = serde_json::to_string(&event) {
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(text) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                        if sender.send(Message::Text("pong".into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use kiosk_serial::SystemPortOpener;

    #[test]
    fn test_snapshot_lists_slide_and_devices() {
        let (state, _rx) = AppState::new(Config::default(), Arc::new(SystemPortOpener)).unwrap();
        let events = snapshot(&state);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].topic, topics::SLIDE_CHANGE);
        assert_eq!(events[0].payload["slide_id"], 1);
        assert_eq!(events[1].payload["device"], "esp32_primary");

        let text = serde_json::to_string(&events[0]).unwrap();
        assert_eq!(text, r#"{"topic":"slide:change","payload":{"slide_id":1}}"#);
    }
}
