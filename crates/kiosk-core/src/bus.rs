//! Topic-keyed publish/subscribe broker
//!
//! The bus is the only integration point between the hardware/scheduler
//! core and the presentation layers. Handlers run synchronously on the
//! publisher's thread, in subscription order. A failing or panicking
//! handler is logged and skipped; its siblings still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{error, trace};

/// A registered event handler. Identity (for `unsubscribe`) is the `Arc`
/// pointer, so clone the `Arc` to register the same handler twice.
pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Well-known topics
pub mod topics {
    pub const DEVICE_CONNECTED: &str = "hardware:device_connected";
    pub const DEVICE_DISCONNECTED: &str = "hardware:device_disconnected";
    pub const DEVICE_ERROR: &str = "hardware:device_error";
    pub const SIGNAL_RECEIVED: &str = "hardware:signal_received";
    pub const CLIENTS_UPDATED: &str = "hardware:clients_updated";
    pub const STATUS_CHANGED: &str = "hardware:status_changed";
    pub const DEV_MODE_ACTIVATED: &str = "hardware:dev_mode_activated";
    pub const DEMO_STARTED: &str = "demo:started";
    pub const DEMO_STOPPED: &str = "demo:stopped";
    pub const SLIDE_CHANGE: &str = "slide:change";

    /// Every topic the core publishes
    pub const ALL: [&str; 10] = [
        DEVICE_CONNECTED,
        DEVICE_DISCONNECTED,
        DEVICE_ERROR,
        SIGNAL_RECEIVED,
        CLIENTS_UPDATED,
        STATUS_CHANGED,
        DEV_MODE_ACTIVATED,
        DEMO_STARTED,
        DEMO_STOPPED,
        SLIDE_CHANGE,
    ];
}

#[derive(Default)]
pub struct EventBus {
    subs: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic. Duplicates are kept.
    pub fn subscribe(&self, topic: &str, handler: Handler) {
        let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
        subs.entry(topic.to_string()).or_default().push(handler);
    }

    /// Remove the first registration of `handler` for `topic`.
    /// Returns whether a registration was removed.
    pub fn unsubscribe(&self, topic: &str, handler: &Handler) -> bool {
        let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = subs.get_mut(topic) else {
            return false;
        };
        match list.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(idx) => {
                list.remove(idx);
                if list.is_empty() {
                    subs.remove(topic);
                }
                true
            }
            None => false,
        }
    }

    /// Number of registrations for a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let subs = self.subs.read().unwrap_or_else(|e| e.into_inner());
        subs.get(topic).map_or(0, Vec::len)
    }

    /// Deliver `payload` to every handler registered for `topic` at the
    /// time of the call.
    pub fn publish(&self, topic: &str, payload: Value) {
        let handlers: Vec<Handler> = {
            let subs = self.subs.read().unwrap_or_else(|e| e.into_inner());
            match subs.get(topic) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        trace!(topic, handlers = handlers.len(), "Publishing event");

        for h in handlers {
            match catch_unwind(AssertUnwindSafe(|| h(&payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(topic, error = %e, "Event handler failed");
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(topic, panic = %msg, "Event handler panicked");
                }
            }
        }
    }

    /// Publish an event with an empty payload
    pub fn publish_empty(&self, topic: &str) {
        self.publish(topic, Value::Object(Default::default()));
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subs = self.subs.read().unwrap_or_else(|e| e.into_inner());
        let mut topics: Vec<_> = subs.iter().map(|(t, l)| (t.clone(), l.len())).collect();
        topics.sort();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let h = handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, h)
    }

    #[test]
    fn test_duplicate_subscription_invoked_twice() {
        let bus = EventBus::new();
        let (count, h) = counter();
        bus.subscribe("slide:change", h.clone());
        bus.subscribe("slide:change", h.clone());

        bus.publish("slide:change", json!({ "slide_id": 1 }));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(bus.unsubscribe("slide:change", &h));
        bus.publish("slide:change", json!({ "slide_id": 2 }));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(bus.subscriber_count("slide:change"), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let bus = EventBus::new();
        let (_, h) = counter();
        let (_, other) = counter();
        assert!(!bus.unsubscribe("demo:started", &h));
        bus.subscribe("demo:started", h);
        assert!(!bus.unsubscribe("demo:started", &other));
        assert_eq!(bus.subscriber_count("demo:started"), 1);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.subscribe(
                "t",
                handler(move |_| {
                    order.lock().unwrap().push(i);
                    Ok(())
                }),
            );
        }
        bus.publish_empty("t");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_handlers_do_not_stop_siblings() {
        let bus = EventBus::new();
        let (count, h) = counter();
        bus.subscribe("t", handler(|_| anyhow::bail!("render failed")));
        bus.subscribe("t", handler(|_| panic!("handler bug")));
        bus.subscribe("t", h);

        bus.publish_empty("t");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resubscribe_during_dispatch_uses_snapshot() {
        let bus = Arc::new(EventBus::new());
        let (count, late) = counter();

        let bus_ref = Arc::downgrade(&bus);
        let self_slot: Arc<Mutex<Option<Handler>>> = Arc::new(Mutex::new(None));
        let slot = self_slot.clone();
        let first = handler(move |_| {
            if let Some(bus) = bus_ref.upgrade() {
                bus.subscribe("t", late.clone());
                if let Some(me) = slot.lock().unwrap().as_ref() {
                    bus.unsubscribe("t", me);
                }
            }
            Ok(())
        });
        *self_slot.lock().unwrap() = Some(first.clone());
        bus.subscribe("t", first);

        bus.publish_empty("t");
        // Late subscriber was added mid-dispatch and must not see this event.
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("t"), 1);

        bus.publish_empty("t");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_payload_is_delivered() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        bus.subscribe(
            topics::SLIDE_CHANGE,
            handler(move |payload| {
                *s.lock().unwrap() = payload["slide_id"].as_i64();
                Ok(())
            }),
        );
        bus.publish(topics::SLIDE_CHANGE, json!({ "slide_id": 4 }));
        assert_eq!(*seen.lock().unwrap(), Some(4));
    }
}
