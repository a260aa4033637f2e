//! In-process transport backed by a local game registry.
//!
//! Serves the same protocol as the relay without any socket, for offline and
//! demo sessions. Multiple transports attached to one [`LocalBackend`] see
//! each other's events exactly as they would through the server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use qudra_protocol::{ClientMessage, ServerMessage};
use qudra_registry::{dispatch, dispatch_disconnect, GameRegistry};

use crate::error::ClientError;
use crate::state::ConnectionState;
use crate::transport::{EventCallback, StateCallback, Transport};

/// Artificial dispatch latency so local play exercises the same async event
/// ordering as the wire, in milliseconds.
pub const LOCAL_DISPATCH_DELAY_MS: u64 = 30;

/// Shared authority for all local transports in the process.
pub struct LocalBackend {
    registry: Mutex<GameRegistry>,
    sinks: Mutex<HashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>>,
}

impl LocalBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(GameRegistry::new()),
            sinks: Mutex::new(HashMap::new()),
        })
    }

    async fn attach(&self, connection_id: Uuid, sink: mpsc::UnboundedSender<ServerMessage>) {
        let mut sinks = self.sinks.lock().await;
        sinks.insert(connection_id, sink);
    }

    async fn detach(&self, connection_id: Uuid) {
        {
            let mut sinks = self.sinks.lock().await;
            sinks.remove(&connection_id);
        }
        let outbound = {
            let mut registry = self.registry.lock().await;
            dispatch_disconnect(&mut registry, connection_id)
        };
        self.route(outbound).await;
    }

    async fn handle(&self, caller: Uuid, message: ClientMessage) {
        let outbound = {
            let mut registry = self.registry.lock().await;
            dispatch(&mut registry, caller, message)
        };
        self.route(outbound).await;
    }

    async fn route(&self, outbound: Vec<(Uuid, ServerMessage)>) {
        let sinks = self.sinks.lock().await;
        for (target, message) in outbound {
            if let Some(sink) = sinks.get(&target) {
                if sink.send(message).is_err() {
                    tracing::debug!(connection = %target, "local sink dropped");
                }
            }
        }
    }
}

/// One simulated connection against a [`LocalBackend`].
pub struct LocalTransport {
    backend: Arc<LocalBackend>,
    connection_id: Uuid,
    connected: Mutex<bool>,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    on_state_change: Arc<Mutex<Option<StateCallback>>>,
}

impl LocalTransport {
    pub fn new(backend: Arc<LocalBackend>) -> Self {
        Self {
            backend,
            connection_id: Uuid::new_v4(),
            connected: Mutex::new(false),
            on_event: Arc::new(Mutex::new(None)),
            on_state_change: Arc::new(Mutex::new(None)),
        }
    }

    /// Stable identity of this simulated connection.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    async fn notify_state(&self, state: ConnectionState) {
        let callback = self.on_state_change.lock().await;
        if let Some(ref cb) = *callback {
            cb(state);
        }
    }
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn connect(&self) -> Result<(), ClientError> {
        {
            let mut connected = self.connected.lock().await;
            if *connected {
                return Ok(());
            }
            *connected = true;
        }

        let (sink, mut events) = mpsc::unbounded_channel::<ServerMessage>();
        self.backend.attach(self.connection_id, sink).await;

        let on_event = Arc::clone(&self.on_event);
        tokio::spawn(async move {
            while let Some(message) = events.recv().await {
                let callback = on_event.lock().await;
                if let Some(ref cb) = *callback {
                    cb(message);
                }
            }
        });

        tracing::info!(connection = %self.connection_id, "local transport attached");
        self.notify_state(ConnectionState::Connected).await;
        Ok(())
    }

    async fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        {
            let connected = self.connected.lock().await;
            if !*connected {
                return Err(ClientError::NotConnected);
            }
        }
        // Defer dispatch so the reply never lands inside the caller's stack.
        tokio::time::sleep(Duration::from_millis(LOCAL_DISPATCH_DELAY_MS)).await;
        self.backend.handle(self.connection_id, message).await;
        Ok(())
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
        {
            let mut connected = self.connected.lock().await;
            if !*connected {
                return;
            }
            *connected = false;
        }
        self.backend.detach(self.connection_id).await;
        self.notify_state(ConnectionState::Disconnected).await;
    }
}
