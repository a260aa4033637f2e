//! Fallback channel over an in-process broadcast bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::fallback::{MessageCallback, TabChannel};

const BUS_CAPACITY: usize = 64;

type SharedCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Create the shared bus that sibling [`BroadcastTabChannel`]s attach to.
pub fn channel_bus() -> broadcast::Sender<(Uuid, String)> {
    broadcast::channel(BUS_CAPACITY).0
}

/// Fallback channel over `tokio::sync::broadcast`.
///
/// Each channel carries a context id and drops its own messages on receive,
/// matching the "siblings only" delivery contract.
pub struct BroadcastTabChannel {
    context_id: Uuid,
    bus: broadcast::Sender<(Uuid, String)>,
    on_message: Arc<Mutex<Option<SharedCallback>>>,
    closed: Arc<AtomicBool>,
}

impl BroadcastTabChannel {
    /// Attach a new context to the bus and start listening.
    pub fn new(bus: broadcast::Sender<(Uuid, String)>) -> Self {
        let context_id = Uuid::new_v4();
        let on_message: Arc<Mutex<Option<SharedCallback>>> = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));

        let mut rx = bus.subscribe();
        let on_message_task = Arc::clone(&on_message);
        let closed_task = Arc::clone(&closed);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok((sender, payload)) => {
                        if closed_task.load(Ordering::SeqCst) {
                            return;
                        }
                        if sender == context_id {
                            continue;
                        }
                        let value: Value = match serde_json::from_str(&payload) {
                            Ok(v) => v,
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping malformed fallback message");
                                continue;
                            }
                        };
                        // Clone the callback out of the lock so it may post
                        // or re-register on this channel without deadlock.
                        let callback = match on_message_task.lock() {
                            Ok(guard) => guard.clone(),
                            Err(poisoned) => poisoned.into_inner().clone(),
                        };
                        if let Some(cb) = callback {
                            cb(value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Best effort by contract, lost messages are fine.
                        tracing::debug!(skipped, "fallback receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Self {
            context_id,
            bus,
            on_message,
            closed,
        }
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }
}

impl TabChannel for BroadcastTabChannel {
    fn post_message(&self, message: &Value) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let payload = message.to_string();
        // Err only means no sibling is listening right now.
        let _ = self.bus.send((self.context_id, payload));
    }

    fn set_on_message(&self, callback: MessageCallback) {
        let mut on_message = match self.on_message.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *on_message = Some(Arc::from(callback));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn collect(into: Arc<Mutex<Vec<Value>>>) -> MessageCallback {
        Box::new(move |value| {
            into.lock().unwrap().push(value);
        })
    }

    #[tokio::test]
    async fn ping_reaches_sibling_but_not_self() {
        let bus = channel_bus();
        let a = BroadcastTabChannel::new(bus.clone());
        let b = BroadcastTabChannel::new(bus);

        let a_seen = Arc::new(Mutex::new(Vec::new()));
        let b_seen = Arc::new(Mutex::new(Vec::new()));
        a.set_on_message(collect(Arc::clone(&a_seen)));
        b.set_on_message(collect(Arc::clone(&b_seen)));

        a.post_message(&json!({"kind": "ping"}));
        settle().await;

        assert_eq!(b_seen.lock().unwrap().as_slice(), &[json!({"kind": "ping"})]);
        assert!(a_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_channel_neither_sends_nor_receives() {
        let bus = channel_bus();
        let a = BroadcastTabChannel::new(bus.clone());
        let b = BroadcastTabChannel::new(bus);

        let b_seen = Arc::new(Mutex::new(Vec::new()));
        b.set_on_message(collect(Arc::clone(&b_seen)));

        b.close();
        a.post_message(&json!({"kind": "ping"}));
        settle().await;
        assert!(b_seen.lock().unwrap().is_empty());

        a.close();
        a.post_message(&json!({"kind": "ping"}));
        settle().await;
        assert!(b_seen.lock().unwrap().is_empty());
    }
}
