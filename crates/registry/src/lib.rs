//! Session registry for active Qudra games
//!
//! This crate is the single source of truth for one backend process: all
//! active games, each game's roster, per-slot ability inventories, and the
//! pending approval-request log. Everything is synchronous against an
//! in-memory store (no I/O); callers serialize access by owning the registry
//! or putting it behind a lock.
//!
//! The [`dispatch`] module layers the notification fan-out on top: it maps
//! each client intent to registry mutations plus the outbound messages owed
//! to specific connections. Both the WebSocket server and the in-process
//! local transport route through it, so live and offline play share one set
//! of semantics.

mod dispatch;
mod errors;
mod game;
mod registry;

pub use dispatch::{dispatch, dispatch_disconnect, Outbound};
pub use errors::AbilityRequestError;
pub use game::{AbilityRequest, GameSession, Player, STARTER_ABILITIES};
pub use registry::GameRegistry;
