//! Connection parameter loading.
//!
//! Parameters can be built programmatically via [`ConnectionParameters`]'s
//! public fields, or loaded from TOML with [`load_from_path`] /
//! [`load_from_str`], following the same `Raw*`-shadow-struct-with-defaults
//! pattern used elsewhere in this codebase's config loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Byte encoding used on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketEncoding {
    #[default]
    Ascii,
    Utf8,
}

impl SocketEncoding {
    /// Decodes a raw line of socket bytes into text. `Ascii` replaces any
    /// non-ASCII byte with `?` rather than failing, matching how lenient
    /// the wire protocol's header parsing is elsewhere; `Utf8` accepts the
    /// full range, falling back to the replacement character on invalid
    /// sequences.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            SocketEncoding::Ascii => bytes.iter().map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' }).collect(),
            SocketEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Encodes a frame for the wire. `Ascii` replaces any non-ASCII
    /// character with `?`; `Utf8` writes the string's own UTF-8 bytes.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            SocketEncoding::Ascii => text.bytes().map(|b| if b.is_ascii() { b } else { b'?' }).collect(),
            SocketEncoding::Utf8 => text.as_bytes().to_vec(),
        }
    }
}

/// Two-tier reconnect backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub fast_retry_count: u32,
    pub fast_retry_delay: Duration,
    pub slow_retry_delay: Duration,
    /// `0` means retry forever.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            fast_retry_count: 5,
            fast_retry_delay: Duration::from_secs(5),
            slow_retry_delay: Duration::from_secs(30),
            max_retries: 0,
        }
    }
}

/// Everything needed to dial, authenticate, and maintain one AMI connection.
#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    pub use_md5_auth: bool,
    pub force_ipv4: bool,
    pub keep_alive: bool,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub encoding: SocketEncoding,
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5038,
            username: String::new(),
            secret: String::new(),
            use_md5_auth: false,
            force_ipv4: false,
            keep_alive: false,
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(10),
            encoding: SocketEncoding::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConnectionParameters {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    secret: Option<String>,
    use_md5_auth: Option<bool>,
    force_ipv4: Option<bool>,
    keep_alive: Option<bool>,
    connect_timeout_secs: Option<u64>,
    ping_interval_secs: Option<u64>,
    encoding: Option<String>,
    reconnect: Option<RawReconnectConfig>,
}

#[derive(Debug, Deserialize)]
struct RawReconnectConfig {
    fast_retry_count: Option<u32>,
    fast_retry_delay_secs: Option<u64>,
    slow_retry_delay_secs: Option<u64>,
    max_retries: Option<u32>,
}

/// Errors raised while loading or validating [`ConnectionParameters`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

pub fn load_from_path(path: &Path) -> Result<ConnectionParameters, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_from_str(&toml_str)
}

pub fn load_from_str(toml_str: &str) -> Result<ConnectionParameters, ConfigError> {
    let raw: RawConnectionParameters =
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let username = raw
        .username
        .ok_or_else(|| ConfigError::MissingField("username".to_owned()))?;
    let secret = raw
        .secret
        .ok_or_else(|| ConfigError::MissingField("secret".to_owned()))?;

    let encoding = match raw.encoding.as_deref() {
        None => SocketEncoding::default(),
        Some(s) if s.eq_ignore_ascii_case("ascii") => SocketEncoding::Ascii,
        Some(s) if s.eq_ignore_ascii_case("utf8") => SocketEncoding::Utf8,
        Some(other) => {
            return Err(ConfigError::InvalidValue(format!(
                "encoding must be 'ascii' or 'utf8', got '{other}'"
            )));
        }
    };

    let defaults = ConnectionParameters::default();
    let reconnect = match raw.reconnect {
        Some(r) => ReconnectConfig {
            fast_retry_count: r.fast_retry_count.unwrap_or(defaults.reconnect.fast_retry_count),
            fast_retry_delay: r
                .fast_retry_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect.fast_retry_delay),
            slow_retry_delay: r
                .slow_retry_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect.slow_retry_delay),
            max_retries: r.max_retries.unwrap_or(defaults.reconnect.max_retries),
        },
        None => defaults.reconnect.clone(),
    };

    Ok(ConnectionParameters {
        host: raw.host.unwrap_or(defaults.host),
        port: raw.port.unwrap_or(defaults.port),
        username,
        secret,
        use_md5_auth: raw.use_md5_auth.unwrap_or(defaults.use_md5_auth),
        force_ipv4: raw.force_ipv4.unwrap_or(defaults.force_ipv4),
        keep_alive: raw.keep_alive.unwrap_or(defaults.keep_alive),
        connect_timeout: raw
            .connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout),
        ping_interval: raw
            .ping_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.ping_interval),
        encoding,
        reconnect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_username_is_rejected() {
        let err = load_from_str("secret = \"s3cr3t\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "username"));
    }

    #[test]
    fn defaults_fill_in_unset_fields() {
        let parsed = load_from_str("username = \"admin\"\nsecret = \"s3cr3t\"\n").unwrap();
        assert_eq!(parsed.port, 5038);
        assert_eq!(parsed.ping_interval, Duration::from_secs(10));
        assert!(!parsed.use_md5_auth);
        assert!(!parsed.keep_alive);
    }

    #[test]
    fn invalid_encoding_is_rejected() {
        let toml = "username = \"a\"\nsecret = \"b\"\nencoding = \"latin1\"\n";
        let err = load_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn ascii_encoding_replaces_non_ascii_bytes() {
        let encoded = SocketEncoding::Ascii.encode("café");
        assert_eq!(SocketEncoding::Ascii.decode(&encoded), "caf??");
    }

    #[test]
    fn utf8_encoding_round_trips() {
        let encoded = SocketEncoding::Utf8.encode("café");
        assert_eq!(SocketEncoding::Utf8.decode(&encoded), "café");
    }
}
