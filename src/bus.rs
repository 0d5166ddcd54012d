//! C4 — Event Subscription Bus.
//!
//! Dispatch is two-tiered: handlers registered for an event's exact
//! concrete type run first, then catch-all handlers registered via
//! [`EventBus::subscribe_any`] — the idiomatic stand-in for "a subscription
//! whose declared type is a supertype of the event's runtime type", since
//! Rust has no class hierarchy to walk at runtime. `ManagerEvent` is the
//! only supertype in this catalog, so a catch-all subscription is exactly
//! equivalent to subscribing at that supertype.

use std::any::TypeId;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::events::ManagerEvent;

type ExactHandler = Box<dyn Fn(&dyn ManagerEvent) + Send + Sync>;

struct Entry<H> {
    id: u64,
    handler: H,
}

/// An RAII handle; dropping it removes the handler it was returned for.
pub struct SubscriptionHandle {
    bus: std::sync::Weak<Inner>,
    kind: SubKind,
    type_id: Option<TypeId>,
    id: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SubKind {
    Exact,
    CatchAll,
    Unhandled,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        let Some(inner) = self.bus.upgrade() else { return };
        match self.kind {
            SubKind::Exact => {
                let type_id = self.type_id.expect("exact subscription always carries a type id");
                let mut exact = inner.exact.lock().unwrap();
                if let Some(chain) = exact.get_mut(&type_id) {
                    chain.retain(|e| e.id != self.id);
                    if chain.is_empty() {
                        exact.remove(&type_id);
                    }
                }
            }
            SubKind::CatchAll => {
                inner.catch_all.lock().unwrap().retain(|e| e.id != self.id);
            }
            SubKind::Unhandled => {
                inner.unhandled.lock().unwrap().retain(|e| e.id != self.id);
            }
        }
    }
}

struct Inner {
    exact: Mutex<HashMap<TypeId, Vec<Entry<ExactHandler>>>>,
    catch_all: Mutex<Vec<Entry<ExactHandler>>>,
    unhandled: Mutex<Vec<Entry<ExactHandler>>>,
    next_id: AtomicU64,
    torn_down: AtomicBool,
    fire_all_events: AtomicBool,
    tx: mpsc::UnboundedSender<Arc<dyn ManagerEvent>>,
}

/// A single-consumer event fanout. Each [`crate::connection::Connection`]
/// owns one internal bus by default; callers may instead route events
/// through their own externally-owned bus via `use_external`.
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            exact: Mutex::new(HashMap::new()),
            catch_all: Mutex::new(Vec::new()),
            unhandled: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
            fire_all_events: AtomicBool::new(false),
            tx,
        });
        tokio::spawn(run_consumer(inner.clone(), rx));
        Self { inner }
    }

    /// When set, an event matched by no exact or catch-all handler also
    /// notifies handlers registered via `on_unhandled`.
    pub fn set_fire_all_events(&self, enabled: bool) {
        self.inner.fire_all_events.store(enabled, Ordering::Relaxed);
    }

    /// Subscribes to events of exactly type `E`.
    pub fn subscribe<E>(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionHandle
    where
        E: ManagerEvent + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let wrapped: ExactHandler = Box::new(move |ev: &dyn ManagerEvent| {
            if let Some(typed) = ev.as_any().downcast_ref::<E>() {
                handler(typed);
            }
        });
        self.inner
            .exact
            .lock()
            .unwrap()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Entry { id, handler: wrapped });
        SubscriptionHandle {
            bus: Arc::downgrade(&self.inner),
            kind: SubKind::Exact,
            type_id: Some(TypeId::of::<E>()),
            id,
        }
    }

    /// Subscribes to every event regardless of concrete type. Runs after
    /// any exact-type handlers for the same event.
    pub fn subscribe_any(&self, handler: impl Fn(&dyn ManagerEvent) + Send + Sync + 'static) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.catch_all.lock().unwrap().push(Entry { id, handler: Box::new(handler) });
        SubscriptionHandle { bus: Arc::downgrade(&self.inner), kind: SubKind::CatchAll, type_id: None, id }
    }

    /// Subscribes to the `fire_all_events`-gated "nothing else matched"
    /// signal.
    pub fn on_unhandled(&self, handler: impl Fn(&dyn ManagerEvent) + Send + Sync + 'static) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.unhandled.lock().unwrap().push(Entry { id, handler: Box::new(handler) });
        SubscriptionHandle { bus: Arc::downgrade(&self.inner), kind: SubKind::Unhandled, type_id: None, id }
    }

    /// Enqueues `event` for asynchronous dispatch. Silently dropped (at
    /// trace level) once the bus has been torn down.
    pub fn publish(&self, event: Arc<dyn ManagerEvent>) {
        if self.inner.torn_down.load(Ordering::Relaxed) {
            tracing::trace!(key = event.event_key(), "dropping event published to a torn-down bus");
            return;
        }
        let _ = self.inner.tx.send(event);
    }

    /// Stops future dispatch; already-queued events are still drained by
    /// the running consumer task so in-flight deliveries complete.
    pub fn tear_down(&self) {
        self.inner.torn_down.store(true, Ordering::Relaxed);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

async fn run_consumer(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<Arc<dyn ManagerEvent>>) {
    while let Some(event) = rx.recv().await {
        let type_id = event.as_any().type_id();
        let mut matched = false;

        {
            // Box<dyn Fn> isn't Clone, so handlers run while the lock is
            // held rather than after copying the chain out. Handlers are
            // synchronous closures, so nothing awaits during this window.
            let guard = inner.exact.lock().unwrap();
            if let Some(chain) = guard.get(&type_id) {
                invoke_all(chain, &*event);
                matched = !chain.is_empty();
            }
        }

        {
            let guard = inner.catch_all.lock().unwrap();
            if !guard.is_empty() {
                invoke_all(&guard, &*event);
                matched = true;
            }
        }

        if !matched && inner.fire_all_events.load(Ordering::Relaxed) {
            let guard = inner.unhandled.lock().unwrap();
            invoke_all(&guard, &*event);
        }
    }
}

fn invoke_all(chain: &[Entry<ExactHandler>], event: &dyn ManagerEvent) {
    for entry in chain {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| (entry.handler)(event)));
        if let Err(panic) = result {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            tracing::error!(key = event.event_key(), panic = message, "event handler panicked, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::catalog::HangupEvent;
    use std::sync::atomic::AtomicUsize;

    fn hangup() -> Arc<dyn ManagerEvent> {
        Arc::new(HangupEvent {
            key: "hangup".to_owned(),
            channel: Some("SIP/1-1".to_owned()),
            cause: Some(16),
            cause_txt: None,
            extra: crate::packet::Packet::new(),
        })
    }

    #[tokio::test]
    async fn exact_then_catch_all_ordering() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let _exact = bus.subscribe::<HangupEvent>(move |_| o1.lock().unwrap().push("exact"));
        let _any = bus.subscribe_any(move |_| o2.lock().unwrap().push("catch_all"));

        bus.publish(hangup());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(*order.lock().unwrap(), vec!["exact", "catch_all"]);
    }

    #[tokio::test]
    async fn dropping_subscription_removes_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = bus.subscribe::<HangupEvent>(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.publish(hangup());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(sub);
        bus.publish(hangup());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_later_handlers() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        let _bad = bus.subscribe_any(|_| panic!("boom"));
        let _good = bus.subscribe_any(move |_| {
            r.fetch_add(1, Ordering::Relaxed);
        });
        bus.publish(hangup());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unhandled_fires_only_when_enabled_and_nothing_matched() {
        let bus = EventBus::new();
        bus.set_fire_all_events(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let _unh = bus.on_unhandled(move |_| {
            f.fetch_add(1, Ordering::Relaxed);
        });
        bus.publish(hangup());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }
}
