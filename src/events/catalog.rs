//! Seed catalog of concrete event types.
//!
//! This is deliberately small — a representative slice covering channel
//! lifecycle, peer status, keepalive, and the user-event escape hatch —
//! not the full hundreds-of-types AMI event surface, which stays an
//! external collaborator plugged in through [`super::registry::EventRegistry::register`].

use std::any::Any;

use super::ManagerEvent;
use super::binder;
use super::registry::EventRegistry;
use crate::packet::Packet;

macro_rules! impl_manager_event {
    ($ty:ty, $key_field:ident) => {
        impl ManagerEvent for $ty {
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn event_key(&self) -> &str {
                &self.$key_field
            }
        }
    };
}

#[derive(Debug, Clone)]
pub struct HangupEvent {
    pub key: String,
    pub channel: Option<String>,
    pub cause: Option<u32>,
    pub cause_txt: Option<String>,
    pub extra: Packet,
}
impl_manager_event!(HangupEvent, key);

fn build_hangup(packet: &Packet) -> Box<dyn ManagerEvent> {
    Box::new(HangupEvent {
        key: "hangup".to_owned(),
        channel: binder::string(packet, "channel"),
        cause: binder::parsed(packet, "cause"),
        cause_txt: binder::string(packet, "cause-txt"),
        extra: packet.excluding(&["event", "actionid", "channel", "cause", "cause-txt"]),
    })
}

#[derive(Debug, Clone)]
pub struct NewchannelEvent {
    pub key: String,
    pub channel: Option<String>,
    pub channel_state: Option<String>,
    pub channel_state_desc: Option<String>,
    pub caller_id_num: Option<String>,
    pub extra: Packet,
}
impl_manager_event!(NewchannelEvent, key);

fn build_newchannel(packet: &Packet) -> Box<dyn ManagerEvent> {
    Box::new(NewchannelEvent {
        key: "newchannel".to_owned(),
        channel: binder::string(packet, "channel"),
        channel_state: binder::string(packet, "channelstate"),
        channel_state_desc: binder::string(packet, "channelstatedesc"),
        caller_id_num: binder::string(packet, "calleridnum"),
        extra: packet.excluding(&[
            "event",
            "actionid",
            "channel",
            "channelstate",
            "channelstatedesc",
            "calleridnum",
        ]),
    })
}

#[derive(Debug, Clone)]
pub struct PeerStatusEvent {
    pub key: String,
    pub peer: Option<String>,
    pub peer_status: Option<String>,
    pub extra: Packet,
}
impl_manager_event!(PeerStatusEvent, key);

fn build_peer_status(packet: &Packet) -> Box<dyn ManagerEvent> {
    Box::new(PeerStatusEvent {
        key: "peerstatus".to_owned(),
        peer: binder::string(packet, "peer"),
        peer_status: binder::string(packet, "peerstatus"),
        extra: packet.excluding(&["event", "actionid", "peer", "peerstatus"]),
    })
}

/// Response-bearing: a `Ping` action's success answer sometimes surfaces
/// to event subscribers as well as to the dispatcher's waiting caller,
/// carrying the split ActionId pair via [`EventRegistry::build`].
#[derive(Debug, Clone)]
pub struct PingEvent {
    pub key: String,
    pub timestamp: Option<String>,
    pub internal_action_id: Option<String>,
    pub caller_action_id: Option<String>,
    pub extra: Packet,
}

impl ManagerEvent for PingEvent {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn event_key(&self) -> &str {
        &self.key
    }
    fn set_correlation(&mut self, internal_action_id: String, caller_action_id: String) {
        self.internal_action_id = Some(internal_action_id);
        self.caller_action_id = Some(caller_action_id);
    }
}

fn build_ping(packet: &Packet) -> Box<dyn ManagerEvent> {
    Box::new(PingEvent {
        key: "ping".to_owned(),
        timestamp: binder::string(packet, "timestamp"),
        internal_action_id: None,
        caller_action_id: None,
        extra: packet.excluding(&["event", "actionid", "timestamp"]),
    })
}

/// The generic wrapper for `UserEvent:<Subtype>` frames; `subtype` is the
/// part of the normalized key after the `user` namespace prefix, e.g.
/// `UserEvent: DoQueueStatus` normalizes to key `"userdoqueuestatus"`.
#[derive(Debug, Clone)]
pub struct UserEvent {
    pub key: String,
    pub subtype: String,
    pub fields: Packet,
}
impl_manager_event!(UserEvent, key);

fn build_user_event(packet: &Packet) -> Box<dyn ManagerEvent> {
    let subtype = packet.get("userevent").unwrap_or_default().trim().to_ascii_lowercase();
    Box::new(UserEvent {
        key: format!("user{subtype}"),
        subtype,
        fields: packet.excluding(&["event", "actionid", "userevent"]),
    })
}

/// The fallback event for any key with no registered constructor.
#[derive(Debug, Clone)]
pub struct UnknownEvent {
    pub key: String,
    pub fields: Packet,
}
impl_manager_event!(UnknownEvent, key);

/// Registers the seed catalog's constructors into `registry`. User events
/// are matched by key prefix rather than exact key, so they're dispatched
/// from [`super::registry::EventRegistry::build`]'s fallback path instead
/// of the exact-match constructor table — see the check there.
pub(super) fn register_builtins(registry: &EventRegistry) {
    registry.register("hangup", build_hangup);
    registry.register("newchannel", build_newchannel);
    registry.register("peerstatus", build_peer_status);
    registry.register("ping", build_ping);
}

/// Whether `key` (already normalized) names a user event, used by the
/// registry's build path to route to [`build_user_event`] instead of the
/// unknown-event fallback. The bare `"user"` key (a `UserEvent` frame with
/// no `UserEvent:` sub-type header) is deliberately excluded — it has no
/// subtype to build from, so it falls through to [`UnknownEvent`] instead.
pub(super) fn is_user_event_key(key: &str) -> bool {
    key.starts_with("user") && key != "user"
}

pub(super) fn build_user(packet: &Packet) -> Box<dyn ManagerEvent> {
    build_user_event(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hangup_binds_known_fields_and_keeps_extras() {
        let mut packet = Packet::new();
        packet.push("Event", "Hangup");
        packet.push("Channel", "SIP/100-1");
        packet.push("Cause", "16");
        packet.push("Cause-txt", "Normal Clearing");
        packet.push("Uniqueid", "1234.5");
        let event = build_hangup(&packet);
        let hangup = event.as_any().downcast_ref::<HangupEvent>().unwrap();
        assert_eq!(hangup.channel.as_deref(), Some("SIP/100-1"));
        assert_eq!(hangup.cause, Some(16));
        assert_eq!(hangup.extra.get("Uniqueid"), Some("1234.5"));
    }

    #[test]
    fn user_event_reads_subtype_from_userevent_header() {
        let mut packet = Packet::new();
        packet.push("Event", "UserEvent");
        packet.push("UserEvent", "MyCustomEvent");
        packet.push("Data", "42");
        let event = build_user_event(&packet);
        let user = event.as_any().downcast_ref::<UserEvent>().unwrap();
        assert_eq!(user.subtype, "mycustomevent");
        assert_eq!(user.key, "usermycustomevent");
        assert_eq!(user.fields.get("Data"), Some("42"));
    }

    #[test]
    fn doqueuestatus_user_event_matches_spec_example() {
        let mut packet = Packet::new();
        packet.push("Event", "UserEvent");
        packet.push("UserEvent", "DoQueueStatus");
        let event = build_user_event(&packet);
        assert_eq!(event.event_key(), "userdoqueuestatus");
    }
}
