//! Connection tracking for WebSocket clients.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use qudra_protocol::ServerMessage;
use qudra_registry::Outbound;

/// Map of connection id to that connection's outbound channel.
pub struct ConnectionMap {
    connections: RwLock<HashMap<Uuid, mpsc::Sender<ServerMessage>>>,
}

impl ConnectionMap {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, connection_id: Uuid, sender: mpsc::Sender<ServerMessage>) {
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, sender);
        tracing::info!(connection_id = %connection_id, "connection registered");
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(&connection_id).is_some() {
            tracing::info!(connection_id = %connection_id, "connection unregistered");
        }
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Fan routed messages out to their target connections.
    ///
    /// A full or closed channel drops the message for that target; the
    /// registry stays authoritative either way and the client can resync
    /// with a state request.
    pub async fn deliver(&self, outbound: Vec<Outbound>) {
        let connections = self.connections.read().await;
        for (target, message) in outbound {
            let Some(sender) = connections.get(&target) else {
                tracing::debug!(connection_id = %target, "dropping message for unknown connection");
                continue;
            };
            if sender.try_send(message).is_err() {
                tracing::warn!(
                    connection_id = %target,
                    "failed to deliver message, channel full or closed"
                );
            }
        }
    }
}

impl Default for ConnectionMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_deliver_unregister() {
        let map = ConnectionMap::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        map.register(id, tx).await;
        assert_eq!(map.count().await, 1);

        map.deliver(vec![(
            id,
            ServerMessage::AbilityRequestApproved {
                request_id: "r-1".to_string(),
            },
        )])
        .await;
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::AbilityRequestApproved { .. })
        ));

        map.unregister(id).await;
        assert_eq!(map.count().await, 0);
    }

    #[tokio::test]
    async fn delivery_to_unknown_target_is_dropped() {
        let map = ConnectionMap::new();
        map.deliver(vec![(
            Uuid::new_v4(),
            ServerMessage::AbilityRequestRejected {
                request_id: "r-1".to_string(),
            },
        )])
        .await;
    }
}
