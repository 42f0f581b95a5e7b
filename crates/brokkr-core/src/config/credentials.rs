//! Snapshot of the vault credentials present in the process environment

use std::fmt;

/// Service account token for non-interactive CLI use
pub const SERVICE_ACCOUNT_TOKEN_VAR: &str = "OP_SERVICE_ACCOUNT_TOKEN";
/// Base URL of a Connect server
pub const CONNECT_HOST_VAR: &str = "OP_CONNECT_HOST";
/// Bearer token for a Connect server
pub const CONNECT_TOKEN_VAR: &str = "OP_CONNECT_TOKEN";

/// Credentials captured once when the configuration is loaded.
///
/// Backend selection and the session short-circuit both read this snapshot,
/// so a credential exported mid-run does not flip an already constructed broker.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialEnv {
    pub service_account_token: Option<String>,
    pub connect_host: Option<String>,
    pub connect_token: Option<String>,
}

impl CredentialEnv {
    /// Read the credential variables from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the credential variables through an arbitrary lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            service_account_token: non_empty(SERVICE_ACCOUNT_TOKEN_VAR),
            connect_host: non_empty(CONNECT_HOST_VAR),
            connect_token: non_empty(CONNECT_TOKEN_VAR),
        }
    }

    /// Connect host and token, when both are present
    pub fn connect(&self) -> Option<(&str, &str)> {
        match (&self.connect_host, &self.connect_token) {
            (Some(host), Some(token)) => Some((host.as_str(), token.as_str())),
            _ => None,
        }
    }

    /// True when no interactive sign-in is ever needed
    pub fn is_non_interactive(&self) -> bool {
        self.service_account_token.is_some() || self.connect().is_some()
    }
}

impl fmt::Debug for CredentialEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |v: &Option<String>| if v.is_some() { "[REDACTED]" } else { "<unset>" };
        f.debug_struct("CredentialEnv")
            .field("service_account_token", &mark(&self.service_account_token))
            .field("connect_host", &self.connect_host)
            .field("connect_token", &mark(&self.connect_token))
            .finish()
    }
}
