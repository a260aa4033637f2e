//! Qudra relay server
//!
//! Stateless-per-process WebSocket relay: every inbound frame is routed
//! through the authoritative in-memory registry and the resulting messages
//! are fanned out to the affected connections. Nothing survives a restart.

pub mod config;
pub mod connections;
pub mod run;
pub mod ws;

pub use config::AppConfig;
pub use run::{router, serve};
pub use ws::AppState;
