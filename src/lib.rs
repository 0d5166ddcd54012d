//! A long-lived client connection engine for the Asterisk Manager
//! Interface (AMI) protocol.
//!
//! This crate owns the connection lifecycle only: dialing, authenticating
//! (plaintext or MD5 challenge/response), framing the line-oriented wire
//! protocol, correlating outbound actions with their responses, fanning
//! out unsolicited events to subscribers, and reconnecting after a
//! transient disconnect. The full AMI action/response/event catalog, a
//! DI container, and any orchestration across multiple servers are
//! explicitly out of scope — [`connection::Connection`] is the thing a
//! caller builds those on top of.

pub mod action;
pub mod auth;
pub mod bus;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod framing;
pub mod liveness;
pub mod packet;
pub mod reconnect;
pub mod socket;
pub mod version;

pub use action::Action;
pub use bus::{EventBus, SubscriptionHandle};
pub use config::ConnectionParameters;
pub use connection::Connection;
pub use dispatcher::{Response, ResponseStatus};
pub use error::{AmiError, AmiResult};
pub use events::ManagerEvent;
pub use packet::Packet;
pub use version::AsteriskVersion;
