//! The explicit event-construction registry that replaces runtime
//! reflection (see the module doc on [`crate::events`]).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

use crate::events::ManagerEvent;
use crate::events::catalog::UnknownEvent;
use crate::events::normalize_event_key;
use crate::packet::Packet;

pub type EventConstructor = fn(&Packet) -> Box<dyn ManagerEvent>;

/// A process-wide table from normalized event key to constructor, plus
/// the dedup state for unrecognized-event logging.
pub struct EventRegistry {
    constructors: Mutex<std::collections::HashMap<String, EventConstructor>>,
    seen_unknown: Mutex<HashSet<String>>,
}

static GLOBAL: OnceLock<EventRegistry> = OnceLock::new();

impl EventRegistry {
    fn new() -> Self {
        let registry = Self {
            constructors: Mutex::new(std::collections::HashMap::new()),
            seen_unknown: Mutex::new(HashSet::new()),
        };
        crate::events::catalog::register_builtins(&registry);
        registry
    }

    /// The shared, process-wide registry. External crates extend it by
    /// calling [`EventRegistry::register`] on this instance before any
    /// connection is built.
    pub fn global() -> &'static EventRegistry {
        GLOBAL.get_or_init(EventRegistry::new)
    }

    /// Registers a constructor for `key` (matched against the output of
    /// [`normalize_event_key`]). A later call with the same key overwrites
    /// an earlier one, so a caller can override a seed catalog entry.
    pub fn register(&self, key: &str, constructor: EventConstructor) {
        self.constructors.lock().unwrap().insert(key.to_ascii_lowercase(), constructor);
    }

    /// Builds the typed event for `packet`, falling back to
    /// [`UnknownEvent`] when no constructor is registered for its key.
    ///
    /// Also returns the `(internal_action_id, caller_action_id)` pair when
    /// the packet carries an `ActionID` header — some events (e.g. the
    /// tail of a `Ping` in certain dialects, or list-completion events)
    /// echo the action that triggered them.
    pub fn build(&self, event_name: &str, packet: &Packet) -> (Box<dyn ManagerEvent>, Option<(String, String)>) {
        let stripped = normalize_event_key(event_name);
        let key = if stripped == "user" {
            match packet.get("userevent") {
                Some(subtype) => format!("user{}", subtype.trim().to_ascii_lowercase()),
                None => stripped,
            }
        } else {
            stripped
        };

        let event = if crate::events::catalog::is_user_event_key(&key) {
            crate::events::catalog::build_user(packet)
        } else {
            match self.constructors.lock().unwrap().get(key.as_str()) {
                Some(ctor) => ctor(packet),
                None => {
                    self.note_unknown(&key);
                    Box::new(UnknownEvent {
                        key: key.clone(),
                        fields: packet.clone(),
                    })
                }
            }
        };
        let correlation = packet.get("actionid").and_then(split_action_id);
        (event, correlation)
    }

    fn note_unknown(&self, key: &str) {
        let mut seen = self.seen_unknown.lock().unwrap();
        let first_sighting = seen.insert(key.to_owned());
        drop(seen);
        if first_sighting {
            if key.starts_with("user") {
                tracing::info!(event = key, "unrecognized user event, falling back to UnknownEvent");
            } else {
                tracing::warn!(event = key, "unrecognized event type, falling back to UnknownEvent");
            }
        } else {
            tracing::trace!(event = key, "unrecognized event type (repeat)");
        }
    }

    /// Test/diagnostic hook: the set of unrecognized event keys observed
    /// so far.
    pub fn unknown_events(&self) -> Vec<String> {
        self.seen_unknown.lock().unwrap().iter().cloned().collect()
    }

    pub fn clear_unknown_events(&self) {
        self.seen_unknown.lock().unwrap().clear();
    }
}

fn split_action_id(full: &str) -> Option<(String, String)> {
    full.split_once('!').map(|(internal, caller)| (internal.to_owned(), caller.to_owned()))
}

/// Convenience free function delegating to [`EventRegistry::global`].
pub fn build(event_name: &str, packet: &Packet) -> (Box<dyn ManagerEvent>, Option<(String, String)>) {
    EventRegistry::global().build(event_name, packet)
}

pub type SharedEvent = Arc<dyn ManagerEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_event_falls_back_to_unknown_and_is_tracked() {
        let registry = EventRegistry::new();
        let mut packet = Packet::new();
        packet.push("Event", "TotallyMadeUpEvent");
        let (event, _) = registry.build("TotallyMadeUpEvent", &packet);
        assert_eq!(event.event_key(), "totallymadeup");
        assert_eq!(registry.unknown_events(), vec!["totallymadeup".to_owned()]);
    }

    #[test]
    fn action_id_is_split_on_bang() {
        let registry = EventRegistry::new();
        let mut packet = Packet::new();
        packet.push("Event", "Hangup");
        packet.push("ActionID", "conn1_7!caller-xyz");
        let (_, correlation) = registry.build("Hangup", &packet);
        assert_eq!(correlation, Some(("conn1_7".to_owned(), "caller-xyz".to_owned())));
    }

    #[test]
    fn ping_event_stores_the_split_action_id_once_applied() {
        use crate::events::catalog::PingEvent;

        let registry = EventRegistry::new();
        let mut packet = Packet::new();
        packet.push("Event", "Ping");
        packet.push("ActionID", "conn1_3!caller-abc");
        let (mut event, correlation) = registry.build("Ping", &packet);
        let (internal_action_id, caller_action_id) = correlation.expect("ping carries an ActionID");
        event.set_correlation(internal_action_id, caller_action_id);

        let ping = event.as_any().downcast_ref::<PingEvent>().unwrap();
        assert_eq!(ping.internal_action_id.as_deref(), Some("conn1_3"));
        assert_eq!(ping.caller_action_id.as_deref(), Some("caller-abc"));
    }
}
