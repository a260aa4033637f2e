//! GameSession and related types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use qudra_protocol::{
    AbilityRequestInfo, GameSnapshot, PlayerInfo, PlayerRole, PlayerSlot, RequestStatus,
};

/// The fixed ability set seeded into a slot the first time it is occupied.
pub const STARTER_ABILITIES: [&str; 5] = [
    "قدرة الشفاء",
    "قدرة الهجوم المزدوج",
    "قدرة الدرع الواقي",
    "قدرة كشف الأوراق",
    "قدرة تبديل الورقة",
];

/// A participant in a game session
#[derive(Debug, Clone)]
pub struct Player {
    pub connection_id: Uuid,
    pub player_name: String,
    pub role: PlayerRole,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            connection_id: self.connection_id,
            player_name: self.player_name.clone(),
            role: self.role,
        }
    }
}

/// One ability request and its audit trail.
///
/// The owning slot is captured at creation time so an approval still lands
/// even if the requesting connection has since left the roster.
#[derive(Debug, Clone)]
pub struct AbilityRequest {
    pub request_id: String,
    pub player_name: String,
    pub slot: PlayerSlot,
    pub ability_text: String,
    pub requested_at: DateTime<Utc>,
    pub status: RequestStatus,
}

impl AbilityRequest {
    pub fn info(&self) -> AbilityRequestInfo {
        AbilityRequestInfo {
            request_id: self.request_id.clone(),
            player_name: self.player_name.clone(),
            ability_text: self.ability_text.clone(),
            requested_at: self.requested_at,
            status: self.status,
        }
    }
}

/// An active game session
///
/// Created on the first join for an unknown game id and never explicitly
/// destroyed here; expiry is an external concern. Requests are retained for
/// the session's lifetime for audit and idempotency checks.
#[derive(Debug)]
pub struct GameSession {
    pub game_id: String,
    /// Roster in join order. Reconnects append; see `GameRegistry::add_player`.
    pub players: Vec<Player>,
    /// Approved/usable abilities per slot. Never contains a duplicate entry.
    abilities: HashMap<PlayerSlot, Vec<String>>,
    requests: HashMap<String, AbilityRequest>,
    /// Insertion order of request ids, for stable listings.
    request_order: Vec<String>,
}

impl GameSession {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            players: Vec::new(),
            abilities: HashMap::new(),
            requests: HashMap::new(),
            request_order: Vec::new(),
        }
    }

    /// Abilities currently granted to a slot.
    pub fn slot_abilities(&self, slot: PlayerSlot) -> &[String] {
        self.abilities.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Seed the starter set into a slot, only if the slot has no abilities yet.
    ///
    /// Returns true if seeding happened.
    pub fn seed_slot(&mut self, slot: PlayerSlot) -> bool {
        let abilities = self.abilities.entry(slot).or_default();
        if !abilities.is_empty() {
            return false;
        }
        abilities.extend(STARTER_ABILITIES.iter().map(|a| (*a).to_string()));
        true
    }

    /// Grant one ability to a slot, skipping duplicates.
    pub fn grant_ability(&mut self, slot: PlayerSlot, ability_text: &str) {
        let abilities = self.abilities.entry(slot).or_default();
        if !abilities.iter().any(|a| a == ability_text) {
            abilities.push(ability_text.to_string());
        }
    }

    /// Replace a slot's ability list, deduplicating while preserving the
    /// first occurrence of each entry.
    pub fn set_slot_abilities(&mut self, slot: PlayerSlot, abilities: Vec<String>) {
        let mut deduped: Vec<String> = Vec::with_capacity(abilities.len());
        for ability in abilities {
            if !deduped.contains(&ability) {
                deduped.push(ability);
            }
        }
        self.abilities.insert(slot, deduped);
    }

    pub fn find_player_by_name(&self, player_name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.player_name == player_name)
    }

    pub fn find_player_by_connection(&self, connection_id: Uuid) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    /// All connection ids on the roster.
    pub fn connections(&self) -> Vec<Uuid> {
        self.players.iter().map(|p| p.connection_id).collect()
    }

    /// Connection ids joined under the host role.
    pub fn host_connections(&self) -> Vec<Uuid> {
        self.players
            .iter()
            .filter(|p| p.role == PlayerRole::Host)
            .map(|p| p.connection_id)
            .collect()
    }

    pub fn get_request(&self, request_id: &str) -> Option<&AbilityRequest> {
        self.requests.get(request_id)
    }

    pub fn get_request_mut(&mut self, request_id: &str) -> Option<&mut AbilityRequest> {
        self.requests.get_mut(request_id)
    }

    pub fn contains_request(&self, request_id: &str) -> bool {
        self.requests.contains_key(request_id)
    }

    /// Record a new pending request. The id must be fresh.
    pub fn record_request(&mut self, request: AbilityRequest) {
        self.request_order.push(request.request_id.clone());
        self.requests.insert(request.request_id.clone(), request);
    }

    /// All requests still pending, in insertion order.
    pub fn pending_requests(&self) -> Vec<&AbilityRequest> {
        self.request_order
            .iter()
            .filter_map(|id| self.requests.get(id))
            .filter(|r| r.status == RequestStatus::Pending)
            .collect()
    }

    /// Wire snapshot of the whole session.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_id: self.game_id.clone(),
            players: self.players.iter().map(Player::info).collect(),
            abilities: self.abilities.clone(),
            requests: self
                .request_order
                .iter()
                .filter_map(|id| self.requests.get(id))
                .map(AbilityRequest::info)
                .collect(),
        }
    }
}
