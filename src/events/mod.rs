//! C3 — Event Builder.
//!
//! Turns a raw [`Packet`](crate::packet::Packet) of event fields into a
//! concrete, typed event. There is no runtime reflection in Rust to walk a
//! class hierarchy the way the original design's "declared type is a
//! supertype of the runtime type" dispatch rule implies, so this module
//! instead exposes an explicit registry keyed by normalized event name —
//! see [`EventRegistry::register`].

pub mod binder;
pub mod catalog;
pub mod registry;

use std::any::Any;
use std::fmt::Debug;

pub use registry::EventRegistry;

/// The supertype every concrete event implements. Catch-all subscriptions
/// (`EventBus::subscribe_any`) receive every event as `&dyn ManagerEvent`;
/// exact-type subscriptions downcast via [`ManagerEvent::as_any`].
pub trait ManagerEvent: Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// The normalized event key this instance was built from, e.g.
    /// `"hangup"` or `"user:mycustomevent"`.
    fn event_key(&self) -> &str;

    /// Response-bearing events (see [`catalog::PingEvent`]) carry the split
    /// `(internal_action_id, caller_action_id)` pair computed by
    /// [`registry::EventRegistry::build`] from the packet's `ActionID`
    /// header. Every other event has no such capability and keeps this
    /// no-op default.
    fn set_correlation(&mut self, _internal_action_id: String, _caller_action_id: String) {}
}

/// Normalizes a raw event name into a lookup key: lowercased, trimmed, with
/// a trailing `event` suffix stripped.
///
/// This is the base `getEventKey` formula: it applies uniformly whether
/// `name` is a raw wire `Event:` header value (`"Hangup"`) or a type-style
/// name (`"HangupEvent"`), which is why both normalize to the same key. The
/// `UserEvent` sub-type concatenation (`"user" + subtype`) is a separate
/// step layered on top by [`crate::events::registry::EventRegistry::build`],
/// since it additionally depends on the packet's `UserEvent:` header, not
/// just the raw name.
pub fn normalize_event_key(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    lower.strip_suffix("event").map(str::to_owned).unwrap_or(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_event_key("  Hangup  "), "hangup");
        assert_eq!(normalize_event_key("PEERSTATUS"), "peerstatus");
    }

    #[test]
    fn strips_trailing_event_suffix_so_type_name_and_wire_name_agree() {
        assert_eq!(normalize_event_key("HangupEvent"), "hangup");
        assert_eq!(normalize_event_key("hangup"), "hangup");
        assert_eq!(normalize_event_key("HangupEvent"), normalize_event_key("hangup"));
    }

    #[test]
    fn userevent_header_value_normalizes_to_bare_user() {
        assert_eq!(normalize_event_key("UserEvent"), "user");
    }
}
