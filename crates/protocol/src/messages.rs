//! WebSocket message types for client-server communication
//!
//! This module contains all message types exchanged over the live connection.
//! These types are used by both the server (sending ServerMessage, receiving
//! ClientMessage) and the client (the reverse). The same vocabulary is carried
//! unchanged by the in-process local transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EventKind, GameSnapshot, PlayerInfo, PlayerRole, PlayerSlot};

// =============================================================================
// Client Messages (Client → Server)
// =============================================================================

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a game session, creating it if the id is unknown
    JoinGame {
        game_id: String,
        role: PlayerRole,
        player_name: String,
    },
    /// Player asks the host to grant an ability
    RequestAbility {
        game_id: String,
        player_id: Uuid,
        ability_text: String,
    },
    /// Host grants a pending ability request
    ApproveAbilityRequest { request_id: String },
    /// Host denies a pending ability request
    RejectAbilityRequest { request_id: String },
    /// Ask for the full session snapshot
    GetGameState { game_id: String },
    /// Replace a slot's ability list wholesale (host tooling)
    SetPlayerAbilities {
        game_id: String,
        player_param: PlayerSlot,
        abilities: Vec<String>,
    },
}

// =============================================================================
// Server Messages (Server → Client)
// =============================================================================

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Join acknowledged; the client records both identifiers
    GameJoined { game_id: String, player_id: Uuid },
    /// Another participant joined (broadcast to the rest of the game)
    PlayerJoined { player: PlayerInfo },
    /// A participant disconnected (broadcast to the rest of the game)
    PlayerLeft { player: PlayerInfo },
    /// A new pending request, delivered to host connections
    AbilityRequested {
        request_id: String,
        player_name: String,
        ability_text: String,
    },
    /// Request resolved favourably (broadcast game-wide)
    AbilityRequestApproved { request_id: String },
    /// Request denied (broadcast game-wide)
    AbilityRequestRejected { request_id: String },
    /// Full session snapshot
    GameState { game: GameSnapshot },
    /// A slot's ability list changed (broadcast game-wide)
    PlayerAbilitiesUpdated {
        player_param: PlayerSlot,
        abilities: Vec<String>,
    },
    /// Protocol-level rejection or diagnostic
    Error { code: String, message: String },
}

impl ServerMessage {
    /// The event name this message dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            ServerMessage::GameJoined { .. } => EventKind::GameJoined,
            ServerMessage::PlayerJoined { .. } => EventKind::PlayerJoined,
            ServerMessage::PlayerLeft { .. } => EventKind::PlayerLeft,
            ServerMessage::AbilityRequested { .. } => EventKind::AbilityRequested,
            ServerMessage::AbilityRequestApproved { .. } => EventKind::AbilityRequestApproved,
            ServerMessage::AbilityRequestRejected { .. } => EventKind::AbilityRequestRejected,
            ServerMessage::GameState { .. } => EventKind::GameState,
            ServerMessage::PlayerAbilitiesUpdated { .. } => EventKind::PlayerAbilitiesUpdated,
            ServerMessage::Error { .. } => EventKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_uses_camel_case_tags() {
        let msg = ClientMessage::JoinGame {
            game_id: "G1".to_string(),
            role: PlayerRole::Player1,
            player_name: "Amir".to_string(),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "joinGame");
        assert_eq!(json["gameId"], "G1");
        assert_eq!(json["role"], "player1");
        assert_eq!(json["playerName"], "Amir");
    }

    #[test]
    fn server_message_kind_matches_wire_tag() {
        let msg = ServerMessage::AbilityRequested {
            request_id: "r-1".to_string(),
            player_name: "Amir".to_string(),
            ability_text: "قدرة جديدة".to_string(),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], msg.kind().as_str());
    }

    #[test]
    fn set_player_abilities_roundtrip() {
        let msg = ClientMessage::SetPlayerAbilities {
            game_id: "G1".to_string(),
            player_param: PlayerSlot::Player2,
            abilities: vec!["قدرة الدرع".to_string()],
        };
        let json = serde_json::to_string(&msg).expect("serialize");
        let back: ClientMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, msg);
    }
}
