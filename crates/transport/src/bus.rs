//! Typed event bus for inbound channel events.
//!
//! Handlers are stored per event kind in registration order. Dispatch
//! isolates each invocation: a failing handler is logged and the rest
//! still run, because one bad subscriber must not take down delivery for
//! all the others.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::protocol::{InboundEvent, InboundEventKind};

type Handler = Box<dyn Fn(&InboundEvent) -> anyhow::Result<()> + Send + Sync>;

/// Opaque subscription token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId {
    kind: InboundEventKind,
    id: u64,
}

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<InboundEventKind, Vec<(u64, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. Handlers for the same kind
    /// run in registration order.
    pub fn subscribe<F>(&self, kind: InboundEventKind, handler: F) -> HandlerId
    where
        F: Fn(&InboundEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        HandlerId { kind, id }
    }

    /// Remove a previously registered handler. Returns whether it existed.
    pub fn unsubscribe(&self, handler_id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(registered) = handlers.get_mut(&handler_id.kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(id, _)| *id != handler_id.id);
        registered.len() != before
    }

    /// Invoke every handler registered for the event's kind.
    pub fn dispatch(&self, event: &InboundEvent) {
        let handlers = self.handlers.read();
        let Some(registered) = handlers.get(&event.kind()) else {
            return;
        };
        for (id, handler) in registered {
            if let Err(error) = handler(event) {
                warn!(
                    handler_id = id,
                    event = event.event_type_name(),
                    %error,
                    "event handler failed; continuing with remaining handlers"
                );
            }
        }
    }

    pub fn handler_count(&self, kind: InboundEventKind) -> usize {
        self.handlers
            .read()
            .get(&kind)
            .map_or(0, |registered| registered.len())
    }

    /// Drop every registered handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn server_time(timestamp: i64) -> InboundEvent {
        InboundEvent::ServerTime { timestamp }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(InboundEventKind::ServerTime, move |_| {
                order.lock().unwrap().push(label);
                Ok(())
            });
        }

        bus.dispatch(&server_time(1));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        {
            let order = Arc::clone(&order);
            bus.subscribe(InboundEventKind::ServerTime, move |_| {
                order.lock().unwrap().push("before");
                Ok(())
            });
        }
        bus.subscribe(InboundEventKind::ServerTime, |_| {
            anyhow::bail!("subscriber exploded")
        });
        {
            let order = Arc::clone(&order);
            bus.subscribe(InboundEventKind::ServerTime, move |_| {
                order.lock().unwrap().push("after");
                Ok(())
            });
        }

        bus.dispatch(&server_time(1));
        assert_eq!(*order.lock().unwrap(), vec!["before", "after"]);
    }

    #[test]
    fn unsubscribe_removes_only_the_target_handler() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0usize));

        let keep = {
            let hits = Arc::clone(&hits);
            bus.subscribe(InboundEventKind::ServerTime, move |_| {
                *hits.lock().unwrap() += 1;
                Ok(())
            })
        };
        let drop_me = bus.subscribe(InboundEventKind::ServerTime, |_| Ok(()));

        assert!(bus.unsubscribe(drop_me));
        assert!(!bus.unsubscribe(drop_me), "second removal finds nothing");
        assert_eq!(bus.handler_count(InboundEventKind::ServerTime), 1);

        bus.dispatch(&server_time(1));
        assert_eq!(*hits.lock().unwrap(), 1);
        let _ = keep;
    }

    #[test]
    fn dispatch_only_reaches_the_matching_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0usize));

        {
            let hits = Arc::clone(&hits);
            bus.subscribe(InboundEventKind::NewMessage, move |_| {
                *hits.lock().unwrap() += 1;
                Ok(())
            });
        }

        bus.dispatch(&server_time(1));
        assert_eq!(*hits.lock().unwrap(), 0);
    }
}
