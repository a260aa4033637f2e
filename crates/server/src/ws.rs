//! WebSocket handling for game connections.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use qudra_protocol::{ClientMessage, ServerMessage};
use qudra_registry::{dispatch, dispatch_disconnect, GameRegistry};

use crate::connections::ConnectionMap;

/// Buffer size for per-connection message channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// Shared state behind the WebSocket route.
pub struct AppState {
    pub registry: Mutex<GameRegistry>,
    pub connections: ConnectionMap,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(GameRegistry::new()),
            connections: ConnectionMap::new(),
        })
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CONNECTION_CHANNEL_BUFFER);
    state.connections.register(connection_id, tx.clone()).await;

    tracing::info!(connection_id = %connection_id, "websocket connection established");

    // Forward routed messages from the channel to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(msg) => {
                    let outbound = {
                        let mut registry = state.registry.lock().await;
                        dispatch(&mut registry, connection_id, msg)
                    };
                    state.connections.deliver(outbound).await;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "failed to parse message");
                    let error = ServerMessage::Error {
                        code: "parse_error".to_string(),
                        message: format!("invalid message format: {e}"),
                    };
                    let _ = tx.try_send(error);
                }
            },
            Ok(Message::Ping(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "websocket closed by client");
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "websocket error");
                break;
            }
            _ => {}
        }
    }

    // The departure broadcast must go out after the sink is removed so the
    // leaver never receives their own playerLeft.
    state.connections.unregister(connection_id).await;
    let outbound = {
        let mut registry = state.registry.lock().await;
        dispatch_disconnect(&mut registry, connection_id)
    };
    state.connections.deliver(outbound).await;
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "websocket connection terminated");
}
