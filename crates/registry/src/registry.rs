//! The authoritative game store

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use qudra_protocol::{GameSnapshot, PlayerRole, PlayerSlot, RequestStatus};

use crate::errors::AbilityRequestError;
use crate::game::{AbilityRequest, GameSession, Player};

/// Manages all active game sessions for one process.
///
/// Mutated only by protocol handlers, never directly by UI code. Within one
/// process mutations are serialized by whoever owns the registry (typically a
/// `tokio::sync::Mutex` at the transport edge), so no internal locking is
/// needed.
#[derive(Debug, Default)]
pub struct GameRegistry {
    games: HashMap<String, GameSession>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a game session only if the id is unknown. Idempotent.
    pub fn create_game(&mut self, game_id: &str) {
        if !self.games.contains_key(game_id) {
            tracing::info!(game_id, "creating game session");
            self.games
                .insert(game_id.to_string(), GameSession::new(game_id));
        }
    }

    /// Add a player to a game, creating the game if missing.
    ///
    /// For `player1`/`player2` roles the slot's starter abilities are seeded
    /// if the slot currently has none. Reconnecting under the same role does
    /// not deduplicate roster entries: a client that reconnects without being
    /// removed first produces a duplicate entry.
    pub fn add_player(
        &mut self,
        connection_id: Uuid,
        game_id: &str,
        player_name: String,
        role: PlayerRole,
    ) {
        self.create_game(game_id);
        let Some(game) = self.games.get_mut(game_id) else {
            // create_game above guarantees presence
            return;
        };

        if let Some(slot) = role.slot() {
            if game.seed_slot(slot) {
                tracing::info!(game_id, %slot, "seeded starter abilities");
            }
        }

        tracing::info!(
            game_id,
            connection_id = %connection_id,
            player_name,
            ?role,
            "player joined"
        );
        game.players.push(Player {
            connection_id,
            player_name,
            role,
            joined_at: Utc::now(),
        });
    }

    /// Remove a connection from whichever roster holds it.
    ///
    /// Abilities already granted to the player's slot are retained: they
    /// belong to the slot, not the transient connection.
    pub fn remove_player(&mut self, connection_id: Uuid) -> Option<(String, Player)> {
        for game in self.games.values_mut() {
            if let Some(idx) = game
                .players
                .iter()
                .position(|p| p.connection_id == connection_id)
            {
                let player = game.players.remove(idx);
                tracing::info!(
                    game_id = game.game_id,
                    connection_id = %connection_id,
                    player_name = player.player_name,
                    "player left"
                );
                return Some((game.game_id.clone(), player));
            }
        }
        None
    }

    /// Record a new pending ability request.
    ///
    /// Rejects when the game is unknown, the named player is not on the
    /// roster (or owns no slot), or the ability is already granted to the
    /// player's slot.
    pub fn handle_ability_request(
        &mut self,
        game_id: &str,
        player_name: &str,
        ability_text: &str,
        request_id: &str,
    ) -> Result<(), AbilityRequestError> {
        let game = self
            .games
            .get_mut(game_id)
            .ok_or_else(|| AbilityRequestError::GameNotFound(game_id.to_string()))?;

        if game.contains_request(request_id) {
            return Err(AbilityRequestError::DuplicateRequestId(
                request_id.to_string(),
            ));
        }

        // Hosts own no slot, so a host name on the roster is still "not found"
        // for the purposes of an ability request.
        let slot = game
            .find_player_by_name(player_name)
            .and_then(|p| p.role.slot())
            .ok_or_else(|| AbilityRequestError::PlayerNotFound(player_name.to_string()))?;

        if game
            .slot_abilities(slot)
            .iter()
            .any(|a| a == ability_text)
        {
            return Err(AbilityRequestError::AlreadyUsed(ability_text.to_string()));
        }

        tracing::info!(game_id, request_id, player_name, ability_text, "ability requested");
        game.record_request(AbilityRequest {
            request_id: request_id.to_string(),
            player_name: player_name.to_string(),
            slot,
            ability_text: ability_text.to_string(),
            requested_at: Utc::now(),
            status: RequestStatus::Pending,
        });
        Ok(())
    }

    /// Grant a pending request.
    ///
    /// Returns false when the game or request is unknown, or the request is
    /// already terminal. Otherwise the ability lands on the requesting slot
    /// and the request becomes `approved`.
    pub fn approve_ability_request(&mut self, game_id: &str, request_id: &str) -> bool {
        let Some(game) = self.games.get_mut(game_id) else {
            return false;
        };
        let Some(request) = game.get_request(request_id) else {
            return false;
        };
        if request.status.is_terminal() {
            tracing::warn!(game_id, request_id, "approve on terminal request ignored");
            return false;
        }

        let slot = request.slot;
        let ability_text = request.ability_text.clone();
        game.grant_ability(slot, &ability_text);
        if let Some(request) = game.get_request_mut(request_id) {
            request.status = RequestStatus::Approved;
        }
        tracing::info!(game_id, request_id, %slot, "ability request approved");
        true
    }

    /// Deny a pending request.
    ///
    /// Terminal rules match approval. A rejected ability stays requestable:
    /// the player may resubmit the same text under a fresh request id.
    pub fn reject_ability_request(&mut self, game_id: &str, request_id: &str) -> bool {
        let Some(game) = self.games.get_mut(game_id) else {
            return false;
        };
        let Some(request) = game.get_request_mut(request_id) else {
            return false;
        };
        if request.status.is_terminal() {
            tracing::warn!(game_id, request_id, "reject on terminal request ignored");
            return false;
        }
        request.status = RequestStatus::Rejected;
        tracing::info!(game_id, request_id, "ability request rejected");
        true
    }

    /// All requests still pending for a game, in insertion order.
    pub fn pending_requests(&self, game_id: &str) -> Vec<&AbilityRequest> {
        self.games
            .get(game_id)
            .map(|g| g.pending_requests())
            .unwrap_or_default()
    }

    /// Replace a slot's ability list. Returns false when the game is unknown.
    pub fn set_player_abilities(
        &mut self,
        game_id: &str,
        slot: PlayerSlot,
        abilities: Vec<String>,
    ) -> bool {
        let Some(game) = self.games.get_mut(game_id) else {
            return false;
        };
        game.set_slot_abilities(slot, abilities);
        true
    }

    /// Find which game recorded a request id.
    pub fn find_game_for_request(&self, request_id: &str) -> Option<&str> {
        self.games
            .values()
            .find(|g| g.contains_request(request_id))
            .map(|g| g.game_id.as_str())
    }

    pub fn get_game(&self, game_id: &str) -> Option<&GameSession> {
        self.games.get(game_id)
    }

    /// Wire snapshot of one game.
    pub fn snapshot(&self, game_id: &str) -> Option<GameSnapshot> {
        self.games.get(game_id).map(GameSession::snapshot)
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }
}
