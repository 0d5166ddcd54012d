//! C6 — Liveness Monitor.
//!
//! Sends a `Ping` whenever the connection has gone `ping_interval` without
//! any inbound byte. A failed ping reports a transient disconnect rather
//! than tearing the connection down itself — that's the reconnector's job.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::action::PingAction;
use crate::dispatcher::ActionDispatcher;
use crate::socket::DisconnectCause;

/// Shared last-seen timestamp, updated by the reader task on every byte
/// received and read by the liveness loop.
#[derive(Clone)]
pub struct LastSeen(Arc<Mutex<Instant>>);

impl LastSeen {
    pub fn now() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn touch(&self) {
        *self.0.lock().unwrap() = Instant::now();
    }

    fn elapsed(&self) -> Duration {
        self.0.lock().unwrap().elapsed()
    }
}

/// Runs the idle-ping loop until `cancel` fires. On a failed ping, sends
/// `disconnect_cause` is reported through `on_ping_failed` and the loop
/// exits — the reconnector (if any) decides what happens next.
pub async fn run(
    dispatcher: Arc<ActionDispatcher>,
    last_seen: LastSeen,
    ping_interval: Duration,
    cancel: CancellationToken,
    on_ping_failed: impl Fn(DisconnectCause) + Send,
) {
    loop {
        let remaining = ping_interval.saturating_sub(last_seen.elapsed());
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("liveness monitor cancelled");
                return;
            }
            () = tokio::time::sleep(remaining) => {}
        }

        if last_seen.elapsed() < ping_interval {
            // Something else reset the clock while we were sleeping.
            continue;
        }

        let ping_cancel = cancel.clone();
        let result = dispatcher.send(&PingAction, ping_interval, ping_cancel).await;
        match result {
            Ok(_) => {
                tracing::trace!("liveness ping succeeded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "liveness ping failed, reporting disconnect");
                on_ping_failed(DisconnectCause::Aborted);
                return;
            }
        }
    }
}
