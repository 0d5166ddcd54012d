//! Actions: the outbound half of the protocol.

use std::fmt;

/// Something that can be serialized onto the wire as an `Action:` frame.
///
/// Concrete actions are plain structs implementing this trait rather than
/// one generic reflective frame builder; the out-of-scope DTO catalog
/// (external collaborators covering the full AMI action surface) plugs in
/// the same way these seed actions do.
pub trait Action: fmt::Debug + Send + Sync {
    /// The `Action:` header value, e.g. `"Login"`.
    fn action_name(&self) -> &str;

    /// Caller-supplied correlation id. `None` means the dispatcher
    /// generates one.
    fn action_id(&self) -> Option<&str> {
        None
    }

    /// `Key=Value` variable pairs, serialized per the version-dependent
    /// delimiter rule in [`crate::version`].
    fn variables(&self) -> &[(String, String)] {
        &[]
    }

    /// All other headers, in the order they should appear on the wire.
    fn properties(&self) -> Vec<(String, String)>;
}

#[derive(Debug, Clone)]
pub struct LoginAction {
    pub username: String,
    pub secret: Option<String>,
    pub auth_type: Option<String>,
    pub key: Option<String>,
    pub events: bool,
}

impl Action for LoginAction {
    fn action_name(&self) -> &str {
        "Login"
    }

    fn properties(&self) -> Vec<(String, String)> {
        let mut props = vec![("Username".to_owned(), self.username.clone())];
        if let Some(secret) = &self.secret {
            props.push(("Secret".to_owned(), secret.clone()));
        }
        if let Some(auth_type) = &self.auth_type {
            props.push(("AuthType".to_owned(), auth_type.clone()));
        }
        if let Some(key) = &self.key {
            props.push(("Key".to_owned(), key.clone()));
        }
        props.push(("Events".to_owned(), if self.events { "on" } else { "off" }.to_owned()));
        props
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeAction {
    pub auth_type: String,
}

impl Action for ChallengeAction {
    fn action_name(&self) -> &str {
        "Challenge"
    }

    fn properties(&self) -> Vec<(String, String)> {
        vec![("AuthType".to_owned(), self.auth_type.clone())]
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogoffAction;

impl Action for LogoffAction {
    fn action_name(&self) -> &str {
        "Logoff"
    }

    fn properties(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PingAction;

impl Action for PingAction {
    fn action_name(&self) -> &str {
        "Ping"
    }

    fn properties(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct CommandAction {
    pub command: String,
}

impl Action for CommandAction {
    fn action_name(&self) -> &str {
        "Command"
    }

    fn properties(&self) -> Vec<(String, String)> {
        vec![("Command".to_owned(), self.command.clone())]
    }
}

/// Serializes `action` into a complete, blank-line-terminated CRLF frame.
///
/// `wire_action_id` is the already-combined `"{internal}!{caller}"` value;
/// correlation itself lives in [`crate::dispatcher`].
pub fn serialize(action: &dyn Action, wire_action_id: &str, variable_delimiter: Option<char>) -> String {
    let mut out = String::new();
    out.push_str("Action: ");
    out.push_str(action.action_name());
    out.push_str("\r\n");
    out.push_str("ActionID: ");
    out.push_str(wire_action_id);
    out.push_str("\r\n");

    for (key, value) in action.properties() {
        out.push_str(&key);
        out.push_str(": ");
        out.push_str(&value);
        out.push_str("\r\n");
    }

    let variables = action.variables();
    if !variables.is_empty() {
        match variable_delimiter {
            Some(delim) => {
                let joined = variables
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(&delim.to_string());
                out.push_str("Variable: ");
                out.push_str(&joined);
                out.push_str("\r\n");
            }
            None => {
                for (k, v) in variables {
                    out.push_str("Variable: ");
                    out.push_str(k);
                    out.push('=');
                    out.push_str(v);
                    out.push_str("\r\n");
                }
            }
        }
    }

    out.push_str("\r\n");
    out
}
