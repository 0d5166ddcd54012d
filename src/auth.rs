//! C5 — Authenticator.
//!
//! Plaintext and MD5 challenge/response login, followed by a one-shot
//! version-discovery hook that feeds [`crate::version::AsteriskVersion`]
//! back into the dispatcher's variable delimiter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use md5::{Digest, Md5};

use crate::action::{ChallengeAction, CommandAction, LoginAction, LogoffAction};
use crate::config::ConnectionParameters;
use crate::dispatcher::{ActionDispatcher, ResponseStatus};
use crate::error::AmiError;
use crate::version::AsteriskVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Disconnected,
    AwaitingBanner,
    Authenticating,
    Authenticated,
}

pub struct Authenticator {
    dispatcher: Arc<ActionDispatcher>,
    state: std::sync::Mutex<AuthState>,
    version_discovered: AtomicBool,
}

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

impl Authenticator {
    pub fn new(dispatcher: Arc<ActionDispatcher>) -> Self {
        Self {
            dispatcher,
            state: std::sync::Mutex::new(AuthState::AwaitingBanner),
            version_discovered: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: AuthState) {
        *self.state.lock().unwrap() = state;
    }

    /// Notifies the authenticator that the identification banner line has
    /// been observed, unblocking `login`.
    pub fn note_banner_seen(&self) {
        if self.state() == AuthState::AwaitingBanner {
            self.set_state(AuthState::Disconnected);
        }
    }

    /// Runs the full login sequence: plaintext or MD5 challenge/response
    /// depending on `params.use_md5_auth`, followed by version discovery.
    pub async fn login(&self, params: &ConnectionParameters) -> Result<AsteriskVersion, AmiError> {
        self.set_state(AuthState::Authenticating);

        let login_action = if params.use_md5_auth {
            self.build_md5_login(params).await?
        } else {
            LoginAction {
                username: params.username.clone(),
                secret: Some(params.secret.clone()),
                auth_type: None,
                key: None,
                events: true,
            }
        };

        let cancel = tokio_util::sync::CancellationToken::new();
        let response = self.dispatcher.send(&login_action, LOGIN_TIMEOUT, cancel).await?;
        if response.status != ResponseStatus::Success {
            self.set_state(AuthState::Disconnected);
            return Err(AmiError::AuthenticationFailed(
                response.message.unwrap_or_else(|| "login rejected".to_owned()),
            ));
        }

        self.dispatcher.set_authenticated(true);
        self.set_state(AuthState::Authenticated);

        let version = self.discover_version().await;
        Ok(version)
    }

    async fn build_md5_login(&self, params: &ConnectionParameters) -> Result<LoginAction, AmiError> {
        let challenge_action = ChallengeAction { auth_type: "MD5".to_owned() };
        let cancel = tokio_util::sync::CancellationToken::new();
        let response = self.dispatcher.send(&challenge_action, LOGIN_TIMEOUT, cancel).await?;
        if response.status != ResponseStatus::Success {
            return Err(AmiError::AuthenticationFailed(
                response.message.unwrap_or_else(|| "challenge rejected".to_owned()),
            ));
        }
        let challenge = response
            .fields
            .get("challenge")
            .ok_or_else(|| AmiError::AuthenticationFailed("challenge response carried no Challenge field".to_owned()))?;

        let mut hasher = Md5::new();
        hasher.update(challenge.as_bytes());
        hasher.update(params.secret.as_bytes());
        let key = hex::encode(hasher.finalize());

        Ok(LoginAction {
            username: params.username.clone(),
            secret: None,
            auth_type: Some("MD5".to_owned()),
            key: Some(key),
            events: true,
        })
    }

    /// Runs `core show version`, falling back to `show version files` for
    /// very old releases that don't implement the former. Runs once per
    /// successful login; failures are non-fatal — the dispatcher simply
    /// keeps the safe `Current`-style delimiter.
    async fn discover_version(&self) -> AsteriskVersion {
        if self.version_discovered.swap(true, Ordering::Relaxed) {
            return AsteriskVersion::Unknown;
        }

        let cancel = tokio_util::sync::CancellationToken::new();
        let primary = CommandAction { command: "core show version".to_owned() };
        let version = match self.dispatcher.send(&primary, Duration::from_secs(5), cancel.clone()).await {
            Ok(response) if response.status == ResponseStatus::Follows => {
                response.fields.output.as_deref().map(AsteriskVersion::parse)
            }
            _ => None,
        };

        let version = match version {
            Some(v) => v,
            None => {
                let fallback = CommandAction { command: "show version files".to_owned() };
                match self.dispatcher.send(&fallback, Duration::from_secs(5), cancel).await {
                    Ok(response) if response.status == ResponseStatus::Follows => response
                        .fields
                        .output
                        .as_deref()
                        .map(AsteriskVersion::parse)
                        .unwrap_or(AsteriskVersion::Unknown),
                    _ => AsteriskVersion::Unknown,
                }
            }
        };

        self.dispatcher.set_variable_delimiter(version.variable_delimiter());
        version
    }

    /// Sends `Logoff` and marks the authenticator as no longer
    /// authenticated, regardless of whether the server's response arrives
    /// before the caller's connection tears down.
    pub async fn logoff(&self) -> Result<(), AmiError> {
        let cancel = tokio_util::sync::CancellationToken::new();
        let result = self.dispatcher.send(&LogoffAction, Duration::from_secs(5), cancel).await;
        self.dispatcher.set_authenticated(false);
        self.set_state(AuthState::Disconnected);
        result.map(|_| ())
    }

    /// Resets to a pre-login state after a disconnect, so a subsequent
    /// reconnect re-runs the full handshake.
    pub fn reset(&self) {
        self.dispatcher.set_authenticated(false);
        self.version_discovered.store(false, Ordering::Relaxed);
        self.set_state(AuthState::AwaitingBanner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_key_matches_known_vector() {
        // challenge "12345" + secret "mysecret" -> a fixed, independently
        // verifiable MD5 digest.
        let mut hasher = Md5::new();
        hasher.update(b"12345");
        hasher.update(b"mysecret");
        let key = hex::encode(hasher.finalize());
        assert_eq!(key, "f9fead0d6328e1be5f206c49dab985a1");
    }

    #[tokio::test]
    async fn note_banner_seen_moves_out_of_awaiting_banner() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let dispatcher = Arc::new(ActionDispatcher::new("c1".to_owned(), tx));
        let auth = Authenticator::new(dispatcher);
        assert_eq!(auth.state(), AuthState::AwaitingBanner);
        auth.note_banner_seen();
        assert_eq!(auth.state(), AuthState::Disconnected);
    }
}
