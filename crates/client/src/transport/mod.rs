//! Transport seam between the connection manager and the wire.
//!
//! Two implementations ship: [`WebSocketTransport`] for live play against the
//! relay server and [`LocalTransport`] for offline/demo sessions served by an
//! in-process registry. The manager never knows which one it holds.

use async_trait::async_trait;

use qudra_protocol::{ClientMessage, ServerMessage};

use crate::error::ClientError;
use crate::state::ConnectionState;

mod local;
mod websocket;

pub use local::{LocalBackend, LocalTransport, LOCAL_DISPATCH_DELAY_MS};
pub use websocket::WebSocketTransport;

/// Callback invoked for every decoded server message.
pub type EventCallback = Box<dyn Fn(ServerMessage) + Send + Sync>;

/// Callback invoked when the transport's own view of the link changes.
///
/// Transports only ever report `Connected` and `Disconnected`; the
/// reconnection states belong to the manager.
pub type StateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// A bidirectional message channel to the session authority.
///
/// `connect` resolves once the link is usable (or fails); detecting a later
/// loss of the link is reported through the state callback, and recovering
/// from it is the caller's business, not the transport's.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), ClientError>;

    async fn send(&self, message: ClientMessage) -> Result<(), ClientError>;

    async fn set_on_event(&self, callback: EventCallback);

    async fn set_on_state_change(&self, callback: StateCallback);

    async fn disconnect(&self);
}
