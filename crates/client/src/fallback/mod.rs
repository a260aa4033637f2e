//! Cross-tab fallback channel.
//!
//! Degraded-mode communication for contexts in the same process when no
//! bidirectional transport is available: broadcast only, best effort, no
//! delivery guarantee and no request/response correlation. Which variant a
//! context uses is explicit construction-time configuration.

use serde_json::Value;

mod broadcast;
mod storage;

pub use broadcast::BroadcastTabChannel;
pub use storage::{SharedStorage, StorageTabChannel, FALLBACK_STORAGE_KEY};

/// Callback invoked with each message posted by a sibling context.
pub type MessageCallback = Box<dyn Fn(Value) + Send + Sync>;

/// One context's handle on the fallback bus.
///
/// A message posted by one context reaches every other open context that has
/// registered a callback; the posting context does not hear its own messages.
pub trait TabChannel: Send + Sync {
    /// Fire-and-forget broadcast to sibling contexts.
    fn post_message(&self, message: &Value);

    /// Register the single receive callback for this context.
    fn set_on_message(&self, callback: MessageCallback);

    /// Detach from the bus; later posts by siblings are no longer delivered.
    fn close(&self);
}
