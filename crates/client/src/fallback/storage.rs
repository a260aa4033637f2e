//! Fallback channel substitute over shared keyed storage.
//!
//! Stands in for the broadcast variant where only a storage surface with
//! change listeners is available. All channels write the same fixed key; a
//! write notifies every other context's listener. Because a storage change
//! never fires in the context that made it, the writer invokes its own
//! callback locally to keep delivery symmetric with the broadcast variant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use crate::fallback::{MessageCallback, TabChannel};

/// Fixed key all fallback traffic is written under.
pub const FALLBACK_STORAGE_KEY: &str = "qudraFallback";

type StorageListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Keyed storage shared by every context in the process, with change
/// listeners keyed by context id.
#[derive(Default)]
pub struct SharedStorage {
    entries: Mutex<HashMap<String, String>>,
    listeners: Mutex<HashMap<Uuid, StorageListener>>,
}

impl SharedStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    /// Write a key and notify every listener except the writer's own.
    pub fn set(&self, writer: Uuid, key: &str, value: &str) {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        // Clone listeners out of the lock so a callback writing storage
        // again cannot deadlock.
        let listeners: Vec<(Uuid, StorageListener)> = lock(&self.listeners)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();
        for (context, listener) in listeners {
            if context != writer {
                listener(key, value);
            }
        }
    }

    fn add_listener(&self, context: Uuid, listener: StorageListener) {
        lock(&self.listeners).insert(context, listener);
    }

    fn remove_listener(&self, context: Uuid) {
        lock(&self.listeners).remove(&context);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

type SharedCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Fallback channel over [`SharedStorage`].
pub struct StorageTabChannel {
    storage: Arc<SharedStorage>,
    context_id: Uuid,
    on_message: Arc<Mutex<Option<SharedCallback>>>,
}

impl StorageTabChannel {
    pub fn new(storage: Arc<SharedStorage>) -> Self {
        Self {
            storage,
            context_id: Uuid::new_v4(),
            on_message: Arc::new(Mutex::new(None)),
        }
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    fn deliver(on_message: &Mutex<Option<SharedCallback>>, payload: &str) {
        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed fallback message");
                return;
            }
        };
        // Clone the callback out of the lock so it may post on this same
        // channel without deadlocking on its own delivery.
        let callback = lock(on_message).clone();
        if let Some(cb) = callback {
            cb(value);
        }
    }
}

impl TabChannel for StorageTabChannel {
    fn post_message(&self, message: &Value) {
        let payload = message.to_string();
        self.storage
            .set(self.context_id, FALLBACK_STORAGE_KEY, &payload);
        // Storage changes do not fire locally; deliver to this context by
        // hand so both channel variants behave alike from the caller's side.
        Self::deliver(&self.on_message, &payload);
    }

    fn set_on_message(&self, callback: MessageCallback) {
        {
            let mut on_message = lock(&self.on_message);
            *on_message = Some(Arc::from(callback));
        }
        let on_message = Arc::clone(&self.on_message);
        self.storage.add_listener(
            self.context_id,
            Arc::new(move |key, value| {
                if key == FALLBACK_STORAGE_KEY {
                    Self::deliver(&on_message, value);
                }
            }),
        );
    }

    fn close(&self) {
        self.storage.remove_listener(self.context_id);
        let mut on_message = lock(&self.on_message);
        *on_message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(into: Arc<Mutex<Vec<Value>>>) -> MessageCallback {
        Box::new(move |value| {
            into.lock().unwrap().push(value);
        })
    }

    #[test]
    fn ping_reaches_sibling_and_self() {
        let storage = SharedStorage::new();
        let a = StorageTabChannel::new(Arc::clone(&storage));
        let b = StorageTabChannel::new(Arc::clone(&storage));

        let a_seen = Arc::new(Mutex::new(Vec::new()));
        let b_seen = Arc::new(Mutex::new(Vec::new()));
        a.set_on_message(collect(Arc::clone(&a_seen)));
        b.set_on_message(collect(Arc::clone(&b_seen)));

        a.post_message(&json!({"kind": "ping"}));

        assert_eq!(b_seen.lock().unwrap().as_slice(), &[json!({"kind": "ping"})]);
        // The storage substitute delivers locally as well.
        assert_eq!(a_seen.lock().unwrap().as_slice(), &[json!({"kind": "ping"})]);
    }

    #[test]
    fn callback_may_post_on_its_own_channel() {
        let storage = SharedStorage::new();
        let a = Arc::new(StorageTabChannel::new(Arc::clone(&storage)));
        let b = StorageTabChannel::new(Arc::clone(&storage));

        let b_seen = Arc::new(Mutex::new(Vec::new()));
        b.set_on_message(collect(Arc::clone(&b_seen)));

        // a answers its own local delivery of a ping with a pong; the
        // re-entrant post must not deadlock on a's callback slot.
        let replier = Arc::clone(&a);
        a.set_on_message(Box::new(move |value| {
            if value == json!({"kind": "ping"}) {
                replier.post_message(&json!({"kind": "pong"}));
            }
        }));

        a.post_message(&json!({"kind": "ping"}));

        let seen = b_seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[json!({"kind": "ping"}), json!({"kind": "pong"})]
        );
    }

    #[test]
    fn closed_channel_stops_receiving() {
        let storage = SharedStorage::new();
        let a = StorageTabChannel::new(Arc::clone(&storage));
        let b = StorageTabChannel::new(Arc::clone(&storage));

        let b_seen = Arc::new(Mutex::new(Vec::new()));
        b.set_on_message(collect(Arc::clone(&b_seen)));
        b.close();

        a.post_message(&json!({"kind": "ping"}));
        assert!(b_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn unrelated_keys_do_not_deliver() {
        let storage = SharedStorage::new();
        let a = StorageTabChannel::new(Arc::clone(&storage));
        let b = StorageTabChannel::new(Arc::clone(&storage));

        let b_seen = Arc::new(Mutex::new(Vec::new()));
        b.set_on_message(collect(Arc::clone(&b_seen)));

        storage.set(a.context_id(), "someOtherRecord", "{\"x\":1}");
        assert!(b_seen.lock().unwrap().is_empty());
    }
}
