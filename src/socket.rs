//! C1 — Socket Lifecycle Manager.
//!
//! Owns the raw connect attempt, OS-level keep-alive, and disconnect-cause
//! classification. Does not own retry scheduling — that's [`crate::reconnect`].

use socket2::SockRef;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::ConnectionParameters;
use crate::error::AmiError;

/// Why a connection ended, used to decide whether the reconnector should
/// run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Caller called `dispose()`/`disposeAsync()`.
    Disposed,
    /// Caller called `logoff()`.
    LoggedOff,
    /// The caller's cancellation token fired mid-operation.
    Cancelled,
    /// A write or read failed outright (broken pipe, connection refused
    /// mid-session, etc).
    Aborted,
    /// The peer reset the connection (TCP RST observed as an io error
    /// kind of `ConnectionReset`).
    Reset,
    /// A read returned zero bytes: the peer closed its write half.
    PeerClosed,
}

impl DisconnectCause {
    /// Whether this cause should ever trigger the reconnector. Dispose
    /// and an explicit logoff are terminal by the caller's own choice;
    /// everything else is presumed transient and eligible for retry
    /// (subject to `keep_alive` and the retry budget).
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            DisconnectCause::Disposed | DisconnectCause::LoggedOff | DisconnectCause::Cancelled
        )
    }
}

/// Attempts a single connection. Allocates a brand new socket for this
/// attempt and this attempt only — some platforms refuse a second connect
/// on a socket that has already failed once, so a failed attempt's
/// `TcpStream` is always dropped rather than reused.
///
/// Resolution honors `force_ipv4`: when set, AAAA-only results are
/// filtered out before the first connect attempt is made.
pub async fn connect(params: &ConnectionParameters) -> Result<TcpStream, AmiError> {
    let candidates = resolve(params).await?;
    let mut last_err = None;

    for addr in candidates {
        match tokio::time::timeout(params.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if params.keep_alive {
                    if let Err(e) = enable_keepalive(&stream) {
                        tracing::warn!(error = %e, "failed to enable SO_KEEPALIVE, continuing without it");
                    }
                }
                tracing::info!(addr = %addr, "connected to AMI server");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                tracing::debug!(addr = %addr, error = %e, "connect attempt failed");
                last_err = Some(e.to_string());
            }
            Err(_) => {
                tracing::debug!(addr = %addr, "connect attempt timed out");
                last_err = Some(format!("connect to {addr} timed out after {:?}", params.connect_timeout));
            }
        }
    }

    Err(AmiError::NotConnected(
        last_err.unwrap_or_else(|| "no addresses to try".to_owned()),
    ))
}

async fn resolve(params: &ConnectionParameters) -> Result<Vec<SocketAddr>, AmiError> {
    let host_port = format!("{}:{}", params.host, params.port);
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&host_port)
        .await
        .map_err(|e| AmiError::NotConnected(format!("resolving '{host_port}': {e}")))?
        .filter(|a| !params.force_ipv4 || a.is_ipv4())
        .collect();

    if addrs.is_empty() {
        return Err(AmiError::NotConnected(format!(
            "no usable addresses for '{host_port}' (force_ipv4={})",
            params.force_ipv4
        )));
    }
    Ok(addrs)
}

/// Enables `SO_KEEPALIVE` on an already-connected stream. `TcpSocket`'s
/// stable API has no keepalive setter, so this reaches into the socket
/// through `socket2::SockRef` the way the rest of this codebase's socket
/// configuration code does.
fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    let sock = SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(60));
    sock.set_tcp_keepalive(&keepalive)
}

/// Classifies a read/write io error into a [`DisconnectCause`]. A clean
/// zero-byte read is reported separately via [`DisconnectCause::PeerClosed`]
/// by the caller, since `io::Error` has no variant for it.
pub fn classify_io_error(err: &std::io::Error) -> DisconnectCause {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => DisconnectCause::Reset,
        _ => DisconnectCause::Aborted,
    }
}
