//! C7 — Reconnector.
//!
//! Two-tier backoff (a handful of fast retries, then a slow steady tier)
//! with an idempotence guarantee: a disconnect signal that arrives while a
//! retry loop is already running is a no-op, not a second competing loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::ReconnectConfig;
use crate::error::AmiError;
use crate::socket::DisconnectCause;

pub type ReconnectAttempt = Arc<dyn Fn() -> BoxFuture<'static, Result<(), AmiError>> + Send + Sync>;

pub struct Reconnector {
    config: ReconnectConfig,
    keep_alive: bool,
    in_flight: AtomicBool,
    cancel: CancellationToken,
}

impl Reconnector {
    pub fn new(config: ReconnectConfig, keep_alive: bool, cancel: CancellationToken) -> Self {
        Self { config, keep_alive, in_flight: AtomicBool::new(false), cancel }
    }

    /// Called whenever the connection drops. Spawns the retry loop unless
    /// one is already in flight, the cause is permanent, or `keep_alive`
    /// is disabled.
    pub fn handle_disconnect(self: &Arc<Self>, cause: DisconnectCause, attempt: ReconnectAttempt) {
        if cause.is_permanent() || !self.keep_alive {
            tracing::debug!(?cause, keep_alive = self.keep_alive, "disconnect will not be retried");
            return;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("a reconnect loop is already in flight, ignoring this disconnect signal");
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.run_retry_loop(attempt).await;
            this.in_flight.store(false, Ordering::Release);
        });
    }

    async fn run_retry_loop(&self, attempt: ReconnectAttempt) {
        let mut tries: u32 = 0;
        let total_budget = self.config.fast_retry_count.saturating_add(self.config.max_retries);
        loop {
            if self.config.max_retries != 0 && tries >= total_budget {
                tracing::warn!(tries, "reconnect retry budget exhausted, giving up");
                return;
            }

            let delay = if tries < self.config.fast_retry_count {
                self.config.fast_retry_delay
            } else {
                self.config.slow_retry_delay
            };

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::debug!("reconnect loop cancelled");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            tries += 1;
            tracing::info!(attempt = tries, "attempting reconnect");
            match tokio::time::timeout(Duration::from_secs(30), attempt()).await {
                Ok(Ok(())) => {
                    tracing::info!(attempt = tries, "reconnect succeeded");
                    return;
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt = tries, error = %e, "reconnect attempt failed");
                }
                Err(_) => {
                    tracing::warn!(attempt = tries, "reconnect attempt timed out after 30s");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn second_disconnect_signal_does_not_spawn_a_second_loop() {
        let config = ReconnectConfig {
            fast_retry_count: 2,
            fast_retry_delay: Duration::from_millis(10),
            slow_retry_delay: Duration::from_millis(50),
            max_retries: 3,
        };
        let reconnector = Arc::new(Reconnector::new(config, true, CancellationToken::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let attempt: ReconnectAttempt = Arc::new(move || {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::Relaxed);
                Err(AmiError::NotConnected("still down".to_owned()))
            })
        });

        reconnector.handle_disconnect(DisconnectCause::Aborted, attempt.clone());
        reconnector.handle_disconnect(DisconnectCause::Aborted, attempt);

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        // Budget is fast_retry_count + max_retries = 5 total attempts; if a
        // second loop had spawned despite the in-flight guard, this could
        // reach up to 10.
        assert!(calls.load(Ordering::Relaxed) <= 5);
    }

    #[tokio::test]
    async fn permanent_cause_is_never_retried() {
        let reconnector = Arc::new(Reconnector::new(ReconnectConfig::default(), true, CancellationToken::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let attempt: ReconnectAttempt = Arc::new(move || {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        });
        reconnector.handle_disconnect(DisconnectCause::Disposed, attempt);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
