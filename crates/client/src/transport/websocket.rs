//! Live WebSocket transport using tokio-tungstenite.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use qudra_protocol::{ClientMessage, ServerMessage};

use crate::error::ClientError;
use crate::state::ConnectionState;
use crate::transport::{EventCallback, StateCallback, Transport};

/// WebSocket transport for live sessions.
///
/// One `connect` call establishes the stream and spawns the read/write
/// tasks; an unexpected close surfaces as a `Disconnected` state callback
/// so the connection manager can decide whether to retry.
pub struct WebSocketTransport {
    url: Url,
    tx: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    on_state_change: Arc<Mutex<Option<StateCallback>>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Prepare a transport for the given ws:// or wss:// endpoint.
    ///
    /// Rejects malformed endpoints up front so that a typo fails once at
    /// setup rather than on every reconnection attempt.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let url = Url::parse(endpoint)
            .map_err(|e| ClientError::TransportInit(format!("invalid endpoint {endpoint}: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ClientError::TransportInit(format!(
                    "unsupported scheme {other}, expected ws or wss"
                )));
            }
        }
        Ok(Self {
            url,
            tx: Arc::new(Mutex::new(None)),
            on_event: Arc::new(Mutex::new(None)),
            on_state_change: Arc::new(Mutex::new(None)),
        })
    }

    async fn notify_state(on_state_change: &Mutex<Option<StateCallback>>, state: ConnectionState) {
        let callback = on_state_change.lock().await;
        if let Some(ref cb) = *callback {
            cb(state);
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<(), ClientError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        tracing::info!(url = %self.url, "connected to relay");

        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<ClientMessage>(32);
        {
            let mut tx_lock = self.tx.lock().await;
            *tx_lock = Some(tx);
        }

        let on_event = Arc::clone(&self.on_event);
        let on_state_change = Arc::clone(&self.on_state_change);
        let tx_slot = Arc::clone(&self.tx);

        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => {
                                let callback = on_event.lock().await;
                                if let Some(ref cb) = *callback {
                                    cb(server_msg);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to parse server message");
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("server closed connection");
                        break;
                    }
                    Ok(Message::Ping(_)) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }

            // Drop the sender so queued sends fail fast, then let the
            // manager see the link go down.
            {
                let mut tx_lock = tx_slot.lock().await;
                *tx_lock = None;
            }
            Self::notify_state(&on_state_change, ConnectionState::Disconnected).await;
        });

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound message");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    tracing::error!(error = %e, "failed to send message");
                    break;
                }
            }
        });

        Self::notify_state(&self.on_state_change, ConnectionState::Connected).await;
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        // Clone the sender to avoid holding the lock across the await.
        let tx = {
            let tx_lock = self.tx.lock().await;
            tx_lock.clone()
        };
        match tx {
            Some(tx) => tx
                .send(message)
                .await
                .map_err(|e| ClientError::Send(e.to_string())),
            None => Err(ClientError::NotConnected),
        }
    }

    async fn set_on_event(&self, callback: EventCallback) {
        let mut on_event = self.on_event.lock().await;
        *on_event = Some(callback);
    }

    async fn set_on_state_change(&self, callback: StateCallback) {
        let mut on_state_change = self.on_state_change.lock().await;
        *on_state_change = Some(callback);
    }

    async fn disconnect(&self) {
        let mut tx_lock = self.tx.lock().await;
        // Dropping the sender ends the write task, which closes the stream.
        *tx_lock = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_endpoint() {
        let err = WebSocketTransport::new("not a url").unwrap_err();
        assert!(matches!(err, ClientError::TransportInit(_)));
    }

    #[test]
    fn rejects_http_scheme() {
        let err = WebSocketTransport::new("http://localhost:3001/ws").unwrap_err();
        assert!(matches!(err, ClientError::TransportInit(_)));
    }

    #[test]
    fn accepts_ws_and_wss() {
        assert!(WebSocketTransport::new("ws://localhost:3001/ws").is_ok());
        assert!(WebSocketTransport::new("wss://play.example.com/ws").is_ok());
    }

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let transport = WebSocketTransport::new("ws://localhost:3001/ws").unwrap();
        let err = transport
            .send(ClientMessage::GetGameState {
                game_id: "g-1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }
}
