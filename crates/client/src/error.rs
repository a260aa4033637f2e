//! Client error types

use qudra_protocol::UnknownEventKind;

/// Errors surfaced by the connection manager and its transports.
///
/// Transport failures feed the reconnection policy; everything else fails
/// fast and synchronously to the caller. Nothing here is fatal to the
/// process.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport could not even be prepared (bad endpoint, unsupported
    /// scheme). Distinct from a connection attempt that failed.
    #[error("transport setup failed: {0}")]
    TransportInit(String),

    /// A connection attempt was made and did not succeed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Operation requires a live connection.
    #[error("not connected")]
    NotConnected,

    /// Game-scoped operation before a successful join.
    #[error("no game joined on this connection")]
    NotJoined,

    /// A connect attempt is already in flight on this manager.
    #[error("connect already in progress")]
    AlreadyConnecting,

    /// The retry ceiling was reached; no further automatic attempts.
    #[error("gave up after {0} connection attempts")]
    ReconnectExhausted(u32),

    /// Reconnection abandoned because the caller disconnected deliberately.
    #[error("connect cancelled by disconnect")]
    Cancelled,

    #[error(transparent)]
    UnknownEvent(#[from] UnknownEventKind),

    #[error("send failed: {0}")]
    Send(String),
}
