//! Key/value seam toward persisted match state.
//!
//! The surrounding setup and gameplay flows own persistence; this crate only
//! reads the current-match record and writes approved slot abilities. Progress
//! records other than these are opaque JSON owned by other features.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use qudra_protocol::PlayerSlot;

const CURRENT_MATCH_KEY: &str = "currentMatch";

/// Storage seam for small JSON records shared with the UI flows.
pub trait SnapshotStore: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-memory store for tests and offline sessions.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: String) {
        self.lock().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}

/// Identifiers of the match the user is currently in.
///
/// Written by the setup flow before connecting; the presence of a tournament
/// id decides whether the session is tournament-scoped or casual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub game_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
}

impl MatchSnapshot {
    pub fn is_tournament(&self) -> bool {
        self.tournament_id.is_some()
    }
}

/// Read the current-match record, if the setup flow wrote one.
pub fn read_current_match(store: &dyn SnapshotStore) -> Option<MatchSnapshot> {
    let raw = store.read(CURRENT_MATCH_KEY)?;
    match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(error = %e, "current-match record is malformed, ignoring");
            None
        }
    }
}

pub fn write_current_match(store: &dyn SnapshotStore, snapshot: &MatchSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => store.write(CURRENT_MATCH_KEY, json),
        Err(e) => tracing::error!(error = %e, "failed to serialize current-match record"),
    }
}

fn slot_abilities_key(game_id: &str, slot: PlayerSlot) -> String {
    format!("abilities:{game_id}:{slot}")
}

/// Persist a slot's approved ability list for the gameplay UI to read.
pub fn write_slot_abilities(
    store: &dyn SnapshotStore,
    game_id: &str,
    slot: PlayerSlot,
    abilities: &[String],
) {
    match serde_json::to_string(abilities) {
        Ok(json) => store.write(&slot_abilities_key(game_id, slot), json),
        Err(e) => tracing::error!(error = %e, "failed to serialize slot abilities"),
    }
}

pub fn read_slot_abilities(
    store: &dyn SnapshotStore,
    game_id: &str,
    slot: PlayerSlot,
) -> Option<Vec<String>> {
    let raw = store.read(&slot_abilities_key(game_id, slot))?;
    serde_json::from_str(&raw).ok()
}
