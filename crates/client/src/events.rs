//! Observer registry for inbound protocol events.
//!
//! Push-based: subscribers register callbacks per event kind and are invoked
//! in registration order when a matching event arrives. A handler returning
//! an error is logged and never interrupts delivery to the remaining
//! handlers for the same event.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use qudra_protocol::{EventKind, ServerMessage};

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&ServerMessage) -> anyhow::Result<()> + Send>;

struct Inner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    /// Kinds whose handlers are currently running outside the lock.
    in_flight: HashSet<EventKind>,
    /// Unsubscribes that arrived for an in-flight kind; applied when the
    /// dispatch pass merges its handlers back.
    deferred_removals: Vec<(EventKind, SubscriptionId)>,
}

/// Event bus keyed by the closed protocol event set.
///
/// The key type is [`EventKind`], so an unknown event name cannot even be
/// registered; string-based callers go through [`EventKind::from_str`] and
/// handle the rejection there.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                handlers: HashMap::new(),
                in_flight: HashSet::new(),
                deferred_removals: Vec::new(),
            })),
        }
    }

    /// Register a handler for one event kind.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl FnMut(&ServerMessage) -> anyhow::Result<()> + Send + 'static,
    ) -> SubscriptionId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        if let Some(handlers) = inner.handlers.get_mut(&kind) {
            let before = handlers.len();
            handlers.retain(|(sub_id, _)| *sub_id != id);
            if handlers.len() != before {
                return true;
            }
        }
        if inner.in_flight.contains(&kind) {
            // The subscription may be in the batch currently running outside
            // the lock; treat it as removed and drop it on merge-back.
            inner.deferred_removals.push((kind, id));
            return true;
        }
        false
    }

    /// Deliver an event to every handler registered for its kind.
    ///
    /// Handlers run with the registry lock released, so a handler may
    /// subscribe or unsubscribe on this same bus. Registrations made during
    /// delivery take effect from the next dispatch.
    pub fn dispatch(&self, message: &ServerMessage) {
        let kind = message.kind();
        let mut running = {
            let mut inner = self.lock();
            match inner.handlers.get_mut(&kind) {
                Some(handlers) if !handlers.is_empty() => {
                    let taken = std::mem::take(handlers);
                    inner.in_flight.insert(kind);
                    taken
                }
                _ => return,
            }
        };

        for (id, handler) in running.iter_mut() {
            if let Err(e) = handler(message) {
                tracing::warn!(event = %kind, subscription = ?id, error = %e, "event handler failed");
            }
        }

        let mut inner = self.lock();
        inner.in_flight.remove(&kind);
        let mut removed = Vec::new();
        inner.deferred_removals.retain(|(k, id)| {
            if *k == kind {
                removed.push(*id);
                false
            } else {
                true
            }
        });
        running.retain(|(id, _)| !removed.contains(id));

        // Subscriptions added by the handlers land after the surviving batch,
        // preserving registration order.
        let entry = inner.handlers.entry(kind).or_default();
        let added_during_dispatch = std::mem::take(entry);
        *entry = running;
        entry.extend(added_during_dispatch);
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock().handlers.get(&kind).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // No invariant spans the guard, so recovering a poisoned registry
        // is sound.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ping() -> ServerMessage {
        ServerMessage::AbilityRequestApproved {
            request_id: "r-1".to_string(),
        }
    }

    #[test]
    fn subscribe_and_dispatch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let count_clone = Arc::clone(&count);
        bus.subscribe(EventKind::AbilityRequestApproved, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.dispatch(&ping());
        bus.dispatch(&ping());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispatch_only_reaches_matching_kind() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let count_clone = Arc::clone(&count);
        bus.subscribe(EventKind::AbilityRequestRejected, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.dispatch(&ping());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery_without_affecting_others() {
        let bus = EventBus::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let first_clone = Arc::clone(&first);
        let id = bus.subscribe(EventKind::AbilityRequestApproved, move |_| {
            first_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let second_clone = Arc::clone(&second);
        bus.subscribe(EventKind::AbilityRequestApproved, move |_| {
            second_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.dispatch(&ping());
        assert!(bus.unsubscribe(EventKind::AbilityRequestApproved, id));
        assert!(!bus.unsubscribe(EventKind::AbilityRequestApproved, id));
        bus.dispatch(&ping());

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handler_may_subscribe_on_the_same_bus() {
        let bus = EventBus::new();
        let late_count = Arc::new(AtomicU32::new(0));

        let bus_inner = bus.clone();
        let late_clone = Arc::clone(&late_count);
        bus.subscribe(EventKind::AbilityRequestApproved, move |_| {
            let late = Arc::clone(&late_clone);
            bus_inner.subscribe(EventKind::AbilityRequestApproved, move |_| {
                late.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        // The nested registration must not deadlock, and only fires from
        // the following dispatch onward.
        bus.dispatch(&ping());
        assert_eq!(late_count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(EventKind::AbilityRequestApproved), 2);

        bus.dispatch(&ping());
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let own_id: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let bus_inner = bus.clone();
        let count_clone = Arc::clone(&count);
        let own_id_clone = Arc::clone(&own_id);
        let id = bus.subscribe(EventKind::AbilityRequestApproved, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *own_id_clone.lock().unwrap() {
                assert!(bus_inner.unsubscribe(EventKind::AbilityRequestApproved, id));
            }
            Ok(())
        });
        *own_id.lock().unwrap() = Some(id);

        bus.dispatch(&ping());
        bus.dispatch(&ping());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(EventKind::AbilityRequestApproved), 0);
    }

    #[test]
    fn failing_handler_does_not_block_later_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        bus.subscribe(EventKind::AbilityRequestApproved, |_| {
            anyhow::bail!("handler exploded")
        });
        let count_clone = Arc::clone(&count);
        bus.subscribe(EventKind::AbilityRequestApproved, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.dispatch(&ping());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
