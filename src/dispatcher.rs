//! C2 — Action Dispatcher.
//!
//! Owns the internal action-id namespace, the pending-response table, and
//! the rule that only `Login`/`Challenge` may be sent before
//! authentication completes. Correlation keys are the internal id string
//! itself (`HashMap` already hashes it); the original design's arena/slab
//! indirection buys nothing extra here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::action::{self, Action};
use crate::error::AmiError;
use crate::packet::Packet;

/// Status line of a `Response:` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
    Follows,
    Goodbye,
    Other(String),
}

impl ResponseStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            s if s.eq_ignore_ascii_case("success") => ResponseStatus::Success,
            s if s.eq_ignore_ascii_case("error") => ResponseStatus::Error,
            s if s.eq_ignore_ascii_case("follows") => ResponseStatus::Follows,
            s if s.eq_ignore_ascii_case("goodbye") => ResponseStatus::Goodbye,
            other => ResponseStatus::Other(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: ResponseStatus,
    pub message: Option<String>,
    pub action_id: Option<String>,
    pub fields: Packet,
}

impl Response {
    fn from_packet(packet: Packet, caller_action_id: Option<String>) -> Response {
        let status = packet.get("response").map(ResponseStatus::parse).unwrap_or(ResponseStatus::Other(String::new()));
        let message = packet.get("message").map(str::to_owned);
        Response { status, message, action_id: caller_action_id, fields: packet }
    }
}

struct Pending {
    tx: oneshot::Sender<Result<Response, AmiError>>,
    caller_action_id: String,
}

const UNAUTHENTICATED_ALLOWLIST: &[&str] = &["Login", "Challenge"];

pub struct ActionDispatcher {
    conn_tag: String,
    counter: AtomicU64,
    pending: Mutex<HashMap<String, Pending>>,
    writer: Mutex<mpsc::UnboundedSender<String>>,
    authenticated: AtomicBool,
    variable_delimiter: Mutex<Option<char>>,
}

impl ActionDispatcher {
    pub fn new(conn_tag: String, writer: mpsc::UnboundedSender<String>) -> Self {
        Self {
            conn_tag,
            counter: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            writer: Mutex::new(writer),
            authenticated: AtomicBool::new(false),
            variable_delimiter: Mutex::new(None),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::Relaxed);
    }

    /// Swaps in the writer channel for a freshly (re)established socket.
    pub fn set_writer(&self, writer: mpsc::UnboundedSender<String>) {
        *self.writer.lock().unwrap() = writer;
    }

    pub fn set_variable_delimiter(&self, delimiter: Option<char>) {
        *self.variable_delimiter.lock().unwrap() = delimiter;
    }

    fn next_internal_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", self.conn_tag, n)
    }

    /// Sends `action` and awaits its response, failing with
    /// [`AmiError::Timeout`] or [`AmiError::Cancelled`] as appropriate.
    pub async fn send(&self, action: &dyn Action, timeout: Duration, cancel: tokio_util::sync::CancellationToken) -> Result<Response, AmiError> {
        if !self.authenticated.load(Ordering::Relaxed) && !UNAUTHENTICATED_ALLOWLIST.contains(&action.action_name()) {
            return Err(AmiError::NotConnected("not authenticated".to_owned()));
        }

        let internal_id = self.next_internal_id();
        let caller_action_id = action.action_id().map(str::to_owned).unwrap_or_else(random_caller_id);
        let wire_action_id = format!("{internal_id}!{caller_action_id}");

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(internal_id.clone(), Pending { tx, caller_action_id });

        let delimiter = *self.variable_delimiter.lock().unwrap();
        let frame = action::serialize(action, &wire_action_id, delimiter);
        if self.writer.lock().unwrap().send(frame).is_err() {
            self.pending.lock().unwrap().remove(&internal_id);
            return Err(AmiError::NotConnected("writer task is gone".to_owned()));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.pending.lock().unwrap().remove(&internal_id);
                Err(AmiError::Cancelled)
            }
            _ = tokio::time::sleep(timeout) => {
                self.pending.lock().unwrap().remove(&internal_id);
                Err(AmiError::Timeout)
            }
            result = rx => {
                result.unwrap_or(Err(AmiError::NotConnected("dispatcher dropped the response channel".to_owned())))
            }
        }
    }

    /// Fires `action` without awaiting a response; `on_complete`, if
    /// given, runs on a spawned task once the response (or a terminal
    /// error) arrives.
    pub fn send_fire_and_forget(
        self: &std::sync::Arc<Self>,
        action: Box<dyn Action>,
        timeout: Duration,
        on_complete: Option<Box<dyn FnOnce(Result<Response, AmiError>) + Send>>,
    ) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = dispatcher.send(action.as_ref(), timeout, tokio_util::sync::CancellationToken::new()).await;
            if let Some(cb) = on_complete {
                cb(result);
            }
        });
    }

    /// Routes an inbound `Response:` packet to its waiting caller.
    /// Packets with no recognizable internal id, or whose internal id has
    /// no pending entry (already timed out, or a forged/duplicate id),
    /// are logged and dropped.
    pub fn complete(&self, packet: Packet) {
        let Some(full_id) = packet.get("actionid") else {
            tracing::debug!("response packet carried no ActionID, dropping");
            return;
        };
        let Some((internal_id, _caller)) = full_id.split_once('!') else {
            tracing::debug!(action_id = full_id, "response ActionID missing internal/caller separator, dropping");
            return;
        };
        let Some(entry) = self.pending.lock().unwrap().remove(internal_id) else {
            tracing::debug!(action_id = full_id, "no pending action for this ActionID, dropping");
            return;
        };
        let response = Response::from_packet(packet, Some(entry.caller_action_id));
        let _ = entry.tx.send(Ok(response));
    }

    /// Fails every pending action; one failed send must not stop the
    /// rest from being notified, so each is handled independently.
    pub fn fail_all(&self, cause: String) {
        let pending: Vec<Pending> = self.pending.lock().unwrap().drain().map(|(_, v)| v).collect();
        for entry in pending {
            let _ = entry.tx.send(Err(AmiError::NotConnected(cause.clone())));
        }
    }
}

fn random_caller_id() -> String {
    use rand::Rng;
    let n: u64 = rand::thread_rng().gen();
    format!("{n:x}")
}
