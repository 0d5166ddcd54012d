//! The failure taxonomy surfaced to callers of the connection facade.
//!
//! Subscription handlers never see an [`AmiError`] — only successfully
//! built events reach them. Every other operation (`send`, `login`,
//! `logoff`) resolves to exactly one of these variants.

/// Errors surfaced by the AMI client core.
#[derive(Debug, thiserror::Error)]
pub enum AmiError {
    /// An action was issued while no live socket was present, or a write
    /// to the socket failed outright.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// The login response carried an error, or the server rejected the
    /// supplied credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The action's deadline elapsed before a matching response arrived.
    #[error("action timed out")]
    Timeout,

    /// The caller's cancellation signal fired before a response arrived.
    #[error("action cancelled")]
    Cancelled,

    /// A packet could not be parsed off the wire.
    #[error("protocol parse error: {0}")]
    ProtocolParse(String),

    /// A typed response or event could not be constructed from the
    /// attribute map.
    #[error("could not build response: {0}")]
    ResponseBuild(String),

    /// The component the caller addressed has already been torn down.
    #[error("component disposed")]
    Disposed,
}

pub type AmiResult<T> = Result<T, AmiError>;
