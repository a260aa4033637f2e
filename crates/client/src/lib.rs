//! Qudra client core
//!
//! The client side of the ability-request synchronization protocol:
//!
//! - [`ConnectionManager`] - lifecycle, reconnection backoff, and typed event
//!   dispatch over one [`Transport`]
//! - [`transport`] - the live WebSocket transport and the in-process local
//!   backend used for offline/demo play
//! - [`fallback`] - best-effort cross-tab broadcast when no bidirectional
//!   transport is available
//! - [`snapshot`] - the key/value seam toward persisted match state owned by
//!   the surrounding UI flows
//!
//! This crate is a library invoked by UI glue; it exposes no command-line
//! surface.

mod backoff;
mod error;
mod events;
mod manager;
mod state;

pub mod fallback;
pub mod snapshot;
pub mod transport;

pub use backoff::{
    Backoff, INITIAL_RETRY_DELAY_MS, MAX_RETRY_ATTEMPTS, MAX_RETRY_DELAY_MS,
};
pub use error::ClientError;
pub use events::{EventBus, SubscriptionId};
pub use manager::{ConnectionManager, GameData};
pub use state::{ConnectionState, ConnectionStateObserver};
