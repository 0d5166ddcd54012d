//! C8 — Connection Facade.
//!
//! Owns every other component (C1–C7) and exposes the public surface:
//! `login`, `send`, `events`, `use_external`/`use_internal`, `logoff`,
//! `dispose`/`dispose_blocking`. Disposal order is reconnector, then
//! liveness monitor, then authenticator, then the writer and reader
//! tasks, then the internal bus, matching the order components were
//! brought up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::auth::Authenticator;
use crate::bus::EventBus;
use crate::config::ConnectionParameters;
use crate::dispatcher::{ActionDispatcher, Response};
use crate::error::AmiError;
use crate::events::ManagerEvent;
use crate::events::registry;
use crate::framing::PacketDecoder;
use crate::liveness::{self, LastSeen};
use crate::packet::Packet;
use crate::reconnect::{Reconnector, ReconnectAttempt};
use crate::socket::{self, DisconnectCause};

struct Generation {
    io_cancel: CancellationToken,
    liveness_cancel: CancellationToken,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

pub struct Connection {
    params: ConnectionParameters,
    dispatcher: Arc<ActionDispatcher>,
    authenticator: Arc<Authenticator>,
    internal_bus: EventBus,
    active_bus: std::sync::Mutex<EventBus>,
    last_seen: LastSeen,
    root_cancel: CancellationToken,
    reconnector: Arc<Reconnector>,
    generation: std::sync::Mutex<Option<Generation>>,
    disposed: AtomicBool,
}

impl Connection {
    pub fn new(params: ConnectionParameters) -> Arc<Self> {
        let conn_tag = format!("conn{:x}", rand::random::<u32>());
        let (dummy_tx, _dummy_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(ActionDispatcher::new(conn_tag, dummy_tx));
        let authenticator = Arc::new(Authenticator::new(dispatcher.clone()));
        let internal_bus = EventBus::new();
        let root_cancel = CancellationToken::new();
        let reconnector = Arc::new(Reconnector::new(
            params.reconnect.clone(),
            params.keep_alive,
            root_cancel.child_token(),
        ));

        Arc::new(Self {
            active_bus: std::sync::Mutex::new(internal_bus.clone()),
            internal_bus,
            params,
            dispatcher,
            authenticator,
            last_seen: LastSeen::now(),
            root_cancel,
            reconnector,
            generation: std::sync::Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    /// Connects, authenticates, and starts the reader/writer/liveness
    /// tasks. On a later transient disconnect the reconnector calls the
    /// same sequence again; callers invoke this once.
    pub async fn login(self: &Arc<Self>) -> Result<(), AmiError> {
        self.connect_and_authenticate().await
    }

    async fn connect_and_authenticate(self: &Arc<Self>) -> Result<(), AmiError> {
        self.connect_and_spawn().await?;
        self.authenticator.login(&self.params).await?;
        Ok(())
    }

    async fn connect_and_spawn(self: &Arc<Self>) -> Result<(), AmiError> {
        let stream = socket::connect(&self.params).await?;
        let (mut read_half, mut write_half) = stream.into_split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();
        self.dispatcher.set_writer(writer_tx);

        let io_cancel = self.root_cancel.child_token();

        let writer_conn = self.clone();
        let writer_cancel = io_cancel.clone();
        let writer_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = writer_cancel.cancelled() => return,
                    frame = writer_rx.recv() => {
                        match frame {
                            Some(frame) => {
                                let bytes = writer_conn.params.encoding.encode(&frame);
                                if let Err(e) = write_half.write_all(&bytes).await {
                                    tracing::warn!(error = %e, "write to AMI socket failed");
                                    writer_conn.report_disconnect(socket::classify_io_error(&e));
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                }
            }
        });

        let reader_conn = self.clone();
        let reader_cancel = io_cancel.clone();
        let reader_handle = tokio::spawn(async move {
            let mut decoder = PacketDecoder::new(reader_conn.params.encoding);
            let mut buf = BytesMut::with_capacity(4096);
            loop {
                tokio::select! {
                    biased;
                    () = reader_cancel.cancelled() => return,
                    result = read_half.read_buf(&mut buf) => {
                        match result {
                            Ok(0) => {
                                reader_conn.report_disconnect(DisconnectCause::PeerClosed);
                                return;
                            }
                            Ok(_) => {
                                reader_conn.last_seen.touch();
                                loop {
                                    match decoder.decode(&mut buf) {
                                        Ok(Some(packet)) => reader_conn.route_packet(packet),
                                        Ok(None) => break,
                                        Err(e) => {
                                            tracing::warn!(error = %e, "framing error, dropping connection");
                                            reader_conn.report_disconnect(DisconnectCause::Aborted);
                                            return;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                reader_conn.report_disconnect(socket::classify_io_error(&e));
                                return;
                            }
                        }
                    }
                }
            }
        });

        let liveness_cancel = self.root_cancel.child_token();
        let liveness_dispatcher = self.dispatcher.clone();
        let liveness_last_seen = self.last_seen.clone();
        let liveness_conn = self.clone();
        let liveness_cancel_for_task = liveness_cancel.clone();
        let ping_interval = self.params.ping_interval;
        tokio::spawn(async move {
            liveness::run(liveness_dispatcher, liveness_last_seen, ping_interval, liveness_cancel_for_task, move |cause| {
                liveness_conn.report_disconnect(cause);
            })
            .await;
        });

        *self.generation.lock().unwrap() =
            Some(Generation { io_cancel, liveness_cancel, reader_handle, writer_handle });

        Ok(())
    }

    fn route_packet(self: &Arc<Self>, packet: Packet) {
        if packet.contains("banner") {
            self.authenticator.note_banner_seen();
            return;
        }
        if packet.contains("response") {
            self.dispatcher.complete(packet);
            return;
        }
        if let Some(event_name) = packet.get("event") {
            let (mut event, correlation) = registry::build(event_name, &packet);
            if let Some((internal_action_id, caller_action_id)) = correlation {
                event.set_correlation(internal_action_id, caller_action_id);
            }
            let event: Arc<dyn ManagerEvent> = Arc::from(event);
            self.active_bus.lock().unwrap().publish(event);
            return;
        }
        tracing::debug!("packet with neither Response nor Event header, dropping");
    }

    fn report_disconnect(self: &Arc<Self>, cause: DisconnectCause) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        tracing::info!(?cause, "AMI connection disconnected");
        self.dispatcher
            .fail_all(format!("Connection lost: {cause:?}, permanent:{}", cause.is_permanent()));
        if let Some(generation) = self.generation.lock().unwrap().take() {
            generation.liveness_cancel.cancel();
            generation.io_cancel.cancel();
        }
        self.authenticator.reset();

        let attempt_self = self.clone();
        let attempt: ReconnectAttempt = Arc::new(move || {
            let connection = attempt_self.clone();
            Box::pin(async move { connection.connect_and_authenticate().await })
        });
        self.reconnector.handle_disconnect(cause, attempt);
    }

    /// Sends `action` and awaits its matching response, uncancellable.
    pub async fn send(&self, action: &dyn Action, timeout: Duration) -> Result<Response, AmiError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(AmiError::Disposed);
        }
        self.dispatcher.send(action, timeout, CancellationToken::new()).await
    }

    /// Sends `action`, returning early with [`AmiError::Cancelled`] if
    /// `cancel` fires before a response arrives.
    pub async fn send_cancellable(
        &self,
        action: &dyn Action,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Response, AmiError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(AmiError::Disposed);
        }
        self.dispatcher.send(action, timeout, cancel).await
    }

    /// Fires `action` without awaiting its response; `on_complete`, if
    /// given, runs once the response (or a terminal error) arrives.
    pub fn send_fire_and_forget(
        self: &Arc<Self>,
        action: Box<dyn Action>,
        timeout: Duration,
        on_complete: Option<Box<dyn FnOnce(Result<Response, AmiError>) + Send>>,
    ) {
        self.dispatcher.send_fire_and_forget(action, timeout, on_complete);
    }

    /// The bus currently receiving this connection's events — the
    /// internal one by default, or whatever was passed to `use_external`.
    pub fn events(&self) -> EventBus {
        self.active_bus.lock().unwrap().clone()
    }

    /// Routes this connection's events through `bus` instead of its
    /// internal one. `bus` is never torn down by the connection — the
    /// caller retains its own `Arc`/clone and owns its lifetime.
    pub fn use_external(&self, bus: EventBus) {
        *self.active_bus.lock().unwrap() = bus;
    }

    /// Reverts to the connection's own internal bus.
    pub fn use_internal(&self) {
        *self.active_bus.lock().unwrap() = self.internal_bus.clone();
    }

    /// Sends `Logoff` and marks the disconnect as permanent — the
    /// reconnector will not retry it.
    pub async fn logoff(self: &Arc<Self>) -> Result<(), AmiError> {
        let result = self.authenticator.logoff().await;
        self.report_disconnect(DisconnectCause::LoggedOff);
        result
    }

    /// Graceful async teardown: reconnector, then liveness, then
    /// authenticator, then the writer/reader tasks, then the internal
    /// bus. Idempotent — a second call is a no-op.
    pub async fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.root_cancel.cancel();
        if let Some(generation) = self.generation.lock().unwrap().take() {
            generation.liveness_cancel.cancel();
            generation.io_cancel.cancel();
            let _ = generation.writer_handle.await;
            let _ = generation.reader_handle.await;
        }
        self.dispatcher.fail_all("connection disposed".to_owned());
        self.authenticator.reset();
        self.internal_bus.tear_down();
    }

    /// Synchronous, bounded-wait variant of [`Connection::dispose`], for
    /// callers (e.g. a `Drop` impl) that cannot `.await`. Runs the async
    /// teardown on a dedicated single-thread runtime and waits up to
    /// `bound` for it to finish.
    pub fn dispose_blocking(self: &Arc<Self>, bound: Duration) {
        let this = self.clone();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("building a dedicated runtime for blocking dispose");
            rt.block_on(this.dispose());
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv_timeout(bound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_starts_with_no_active_generation() {
        let params = ConnectionParameters {
            username: "admin".to_owned(),
            secret: "secret".to_owned(),
            ..ConnectionParameters::default()
        };
        let conn = Connection::new(params);
        assert!(conn.generation.lock().unwrap().is_none());
        assert!(!conn.disposed.load(Ordering::SeqCst));
    }
}
