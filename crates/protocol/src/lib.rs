//! Qudra Protocol - Shared types for client/server communication
//!
//! This crate contains every type that crosses the wire between the game
//! client and the session server:
//! - WebSocket message enums (`ClientMessage`, `ServerMessage`)
//! - Shared enums and value objects (roles, slots, request status)
//! - The full session snapshot (`GameSnapshot`)
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, uuid, chrono, and serde_json
//! 2. **No business logic** - Pure data types and serialization

pub mod messages;
pub mod types;

pub use messages::{ClientMessage, ServerMessage};
pub use types::{
    AbilityRequestInfo, EventKind, GameSnapshot, PlayerInfo, PlayerRole, PlayerSlot, RequestStatus,
    UnknownEventKind,
};
