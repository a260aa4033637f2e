//! Connection lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where the link to the session authority currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link, and none being attempted
    Disconnected,
    /// First connection attempt in flight
    Connecting,
    /// Link established and usable
    Connected,
    /// Link lost or refused, retry cycle in progress
    Reconnecting,
    /// Retry ceiling reached; only an explicit connect leaves this state
    Failed,
}

impl ConnectionState {
    /// The `u8` representation held in the shared atomic.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Failed => 4,
        }
    }

    /// Decode the atomic representation; unknown values read as
    /// `Disconnected`.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Cheap, cloneable read-only view of the connection state.
///
/// UI glue polls this without holding the manager; the manager writes the
/// shared atomic as the retry state machine moves.
#[derive(Clone)]
pub struct ConnectionStateObserver {
    state: Arc<AtomicU8>,
}

impl ConnectionStateObserver {
    pub fn new(state: Arc<AtomicU8>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}
