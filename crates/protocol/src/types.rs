//! Shared enums and value objects used by both message directions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role a connection joins a game under.
///
/// `Host` moderates the session and decides ability requests; the two player
/// roles each map to a fixed slot that owns an ability list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Player1,
    Player2,
    Host,
}

impl PlayerRole {
    /// The slot this role plays in, if any. Hosts own no slot.
    pub fn slot(self) -> Option<PlayerSlot> {
        match self {
            PlayerRole::Player1 => Some(PlayerSlot::Player1),
            PlayerRole::Player2 => Some(PlayerSlot::Player2),
            PlayerRole::Host => None,
        }
    }
}

/// One of the two fixed player slots within a game session.
///
/// Abilities belong to a slot, not to the transient connection currently
/// playing it, so they survive disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerSlot {
    Player1,
    Player2,
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerSlot::Player1 => write!(f, "player1"),
            PlayerSlot::Player2 => write!(f, "player2"),
        }
    }
}

/// Lifecycle of an ability request.
///
/// `Approved` and `Rejected` are terminal: a request transitions out of
/// `Pending` exactly once and is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

/// A participant on a game roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub connection_id: Uuid,
    pub player_name: String,
    pub role: PlayerRole,
}

/// Wire view of one ability request, including its audit fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityRequestInfo {
    pub request_id: String,
    pub player_name: String,
    pub ability_text: String,
    pub requested_at: DateTime<Utc>,
    pub status: RequestStatus,
}

/// Full snapshot of one game session, sent in reply to `getGameState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game_id: String,
    pub players: Vec<PlayerInfo>,
    pub abilities: HashMap<PlayerSlot, Vec<String>>,
    pub requests: Vec<AbilityRequestInfo>,
}

/// The closed set of server-to-client event names.
///
/// Observer registration is keyed by this enum; string names that do not map
/// to a variant are rejected at registration time rather than silently
/// swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GameJoined,
    PlayerJoined,
    PlayerLeft,
    AbilityRequested,
    AbilityRequestApproved,
    AbilityRequestRejected,
    GameState,
    PlayerAbilitiesUpdated,
    Error,
}

impl EventKind {
    /// All event kinds, in protocol order.
    pub const ALL: [EventKind; 9] = [
        EventKind::GameJoined,
        EventKind::PlayerJoined,
        EventKind::PlayerLeft,
        EventKind::AbilityRequested,
        EventKind::AbilityRequestApproved,
        EventKind::AbilityRequestRejected,
        EventKind::GameState,
        EventKind::PlayerAbilitiesUpdated,
        EventKind::Error,
    ];

    /// The wire name of this event (matches the serde tag).
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::GameJoined => "gameJoined",
            EventKind::PlayerJoined => "playerJoined",
            EventKind::PlayerLeft => "playerLeft",
            EventKind::AbilityRequested => "abilityRequested",
            EventKind::AbilityRequestApproved => "abilityRequestApproved",
            EventKind::AbilityRequestRejected => "abilityRequestRejected",
            EventKind::GameState => "gameState",
            EventKind::PlayerAbilitiesUpdated => "playerAbilitiesUpdated",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for event names outside the closed protocol set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}
