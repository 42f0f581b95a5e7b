//! Configuration file loading and parsing

use super::credentials::CredentialEnv;
use crate::error::{Error, Result};
use crate::utils::{expand_path, get_home_dir};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["brokkr.yaml", "brokkr.yml"];

/// Default vault CLI executable
pub const DEFAULT_CLI_BINARY: &str = "op";

/// Default window during which a successful session check is trusted
pub const DEFAULT_SESSION_TTL_SECS: u64 = 10 * 60;

/// Default pause between keep-alive checks
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 15 * 60;

/// Upper bound for every configured interval (one year)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// On-disk shape of `brokkr.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfigFile {
    /// Default vault account (sign-in address, shorthand or account uuid)
    pub account: Option<String>,

    /// Vault CLI executable
    pub cli_binary: String,

    /// dotenv file used to share the session token between processes
    pub token_file: Option<String>,

    /// Seconds a successful session check is trusted
    pub session_ttl_secs: u64,

    /// Seconds between keep-alive checks; 0 disables the worker
    pub keepalive_interval_secs: u64,

    /// Seconds a cached vault item stays valid; unset keeps it for the process lifetime
    pub cache_ttl_secs: Option<u64>,

    /// Per-request timeout for the Connect API
    pub request_timeout_secs: Option<u64>,
}

impl Default for BrokerConfigFile {
    fn default() -> Self {
        Self {
            account: None,
            cli_binary: DEFAULT_CLI_BINARY.to_string(),
            token_file: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            cache_ttl_secs: None,
            request_timeout_secs: None,
        }
    }
}

/// Resolved broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Default account; references with an empty account use it
    pub account: String,
    pub cli_binary: String,
    pub token_file: Option<PathBuf>,
    pub session_ttl: Duration,
    /// `None` disables the keep-alive worker
    pub keepalive_interval: Option<Duration>,
    pub cache_ttl: Option<Duration>,
    pub request_timeout: Option<Duration>,
    /// Credentials captured at load time
    pub credentials: CredentialEnv,
    /// Path of the file this configuration came from, if any
    pub config_path: Option<Utf8PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::from_file(BrokerConfigFile::default(), CredentialEnv::default(), None)
    }
}

impl BrokerConfig {
    /// Load configuration from the given path, or search for it.
    ///
    /// Without an explicit path the current directory and its parents are
    /// searched, then `~/.config/brokkr/`. A missing file is not an error;
    /// defaults apply. Environment overrides are applied last.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let found = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::config_not_found(p.as_str())
                    } else {
                        Error::Io(e)
                    }
                })?;
                Some((p.to_owned(), content))
            }
            None => Self::find_config()?,
        };

        let (file, config_path) = match found {
            Some((config_path, content)) => {
                debug!("Loading broker configuration from {}", config_path);
                (Self::parse(&content)?, Some(config_path))
            }
            None => (BrokerConfigFile::default(), None),
        };

        let mut config = Self::from_file(file, CredentialEnv::from_env(), config_path);
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse the YAML body of a configuration file
    pub fn parse(content: &str) -> Result<BrokerConfigFile> {
        if content.trim().is_empty() {
            return Ok(BrokerConfigFile::default());
        }
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Build a resolved configuration from its file form
    pub fn from_file(
        file: BrokerConfigFile,
        credentials: CredentialEnv,
        config_path: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            account: file.account.unwrap_or_default(),
            cli_binary: file.cli_binary,
            token_file: file.token_file.as_deref().map(expand_path),
            session_ttl: Duration::from_secs(file.session_ttl_secs),
            keepalive_interval: match file.keepalive_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            cache_ttl: file.cache_ttl_secs.map(Duration::from_secs),
            request_timeout: file.request_timeout_secs.map(Duration::from_secs),
            credentials,
            config_path,
        }
    }

    /// Apply `BROKKR_*` overrides, falling back to `OP_ACCOUNT` for the account
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(account) = non_empty("BROKKR_ACCOUNT") {
            self.account = account;
        } else if self.account.is_empty() {
            if let Some(account) = non_empty("OP_ACCOUNT") {
                self.account = account;
            }
        }
        if let Some(cli) = non_empty("BROKKR_CLI") {
            self.cli_binary = cli;
        }
        if let Some(token_file) = non_empty("BROKKR_TOKEN_FILE") {
            self.token_file = Some(expand_path(&token_file));
        }
    }

    /// Reject values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.cli_binary.trim().is_empty() {
            return Err(Error::invalid_config("cli_binary must not be empty"));
        }
        if self.session_ttl.is_zero() {
            return Err(Error::invalid_config("session_ttl_secs must be greater than zero"));
        }

        let max = Duration::from_secs(MAX_INTERVAL_SECS);
        let intervals = [
            ("session_ttl_secs", Some(self.session_ttl)),
            ("keepalive_interval_secs", self.keepalive_interval),
            ("cache_ttl_secs", self.cache_ttl),
            ("request_timeout_secs", self.request_timeout),
        ];
        for (name, value) in intervals {
            if value.is_some_and(|v| v > max) {
                return Err(Error::invalid_config(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_INTERVAL_SECS
                )));
            }
        }
        Ok(())
    }

    /// Builder-style account override
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Builder-style credential override
    pub fn with_credentials(mut self, credentials: CredentialEnv) -> Self {
        self.credentials = credentials;
        self
    }

    /// Builder-style token file override
    pub fn with_token_file(mut self, path: Option<PathBuf>) -> Self {
        self.token_file = path;
        self
    }

    /// Builder-style keep-alive override
    pub fn with_keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Default location of the user level configuration file
    pub fn user_config_path() -> Result<PathBuf> {
        Ok(get_home_dir()?.join(".config").join("brokkr").join("brokkr.yaml"))
    }

    /// Find a configuration file in the current directory, its parents, then the user config dir
    fn find_config() -> Result<Option<(Utf8PathBuf, String)>> {
        let cwd = std::env::current_dir().map_err(Error::Io)?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))?;

        let mut current = cwd.as_path();

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let content = fs::read_to_string(&path)?;
                    return Ok(Some((path, content)));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        if let Ok(user_path) = Self::user_config_path() {
            if user_path.exists() {
                let content = fs::read_to_string(&user_path)?;
                let path = Utf8PathBuf::try_from(user_path).map_err(|_| {
                    Error::invalid_config("User config path is not valid UTF-8")
                })?;
                return Ok(Some((path, content)));
            }
        }

        Ok(None)
    }
}
