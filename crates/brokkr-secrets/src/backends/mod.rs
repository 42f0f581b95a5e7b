//! Vault backends
//!
//! Two ways to reach the vault:
//! - [`ConnectClient`]: a Connect server over HTTP, selected when
//!   `OP_CONNECT_HOST` and `OP_CONNECT_TOKEN` are both set
//! - [`OpCli`]: the local `op` binary, which needs a session unless a
//!   service account token is present
//!
//! The choice is made once per broker. There is no fallback from one to the
//! other at lookup time.

mod cli;
mod connect;

pub use cli::{OpCli, WhoAmI};
pub use connect::ConnectClient;

use crate::error::{Error, Result};
use crate::types::FieldMap;
use brokkr_core::{BrokerConfig, CommandRunner};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::info;

/// Vault-assigned item/vault identifiers: 26 lowercase alphanumerics
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]{26}$").expect("valid identifier regex"));

/// True if `name` has the shape of a vault-assigned identifier rather than a title
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

pub enum Backend {
    Remote(ConnectClient),
    LocalCli(OpCli),
}

impl Backend {
    /// Pick the backend for this configuration.
    ///
    /// Connect wins when both of its variables are present. Otherwise the
    /// CLI is used if it is on PATH.
    pub fn select(config: &BrokerConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        if let Some((host, token)) = config.credentials.connect() {
            let client = ConnectClient::new(host, token, config.request_timeout)?;
            info!(host, "Using Connect backend");
            return Ok(Self::Remote(client));
        }

        let cli = OpCli::new(runner, config.cli_binary.clone());
        if cli.is_available() {
            info!(binary = %config.cli_binary, "Using CLI backend");
            return Ok(Self::LocalCli(cli));
        }

        Err(Error::backend_unavailable(format!(
            "OP_CONNECT_HOST/OP_CONNECT_TOKEN are not set and `{}` is not on PATH",
            config.cli_binary
        )))
    }

    /// Short name for logs and audit records
    pub fn name(&self) -> &'static str {
        match self {
            Self::Remote(_) => "connect",
            Self::LocalCli(_) => "cli",
        }
    }

    /// Whether lookups need an authenticated CLI session first
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::LocalCli(_))
    }

    /// All fields of an item; `None` when the item (or its vault) does not exist
    pub async fn fetch_fields(
        &self,
        account: &str,
        vault: &str,
        item: &str,
    ) -> Result<Option<FieldMap>> {
        match self {
            Self::Remote(client) => client.item_fields(vault, item).await,
            Self::LocalCli(cli) => cli.item_fields(account, vault, item).await,
        }
    }

    /// Raw content of a document item; `None` when it does not exist
    pub async fn fetch_document(
        &self,
        account: &str,
        vault: &str,
        item: &str,
        file_name: Option<&str>,
    ) -> Result<Option<String>> {
        match self {
            Self::Remote(client) => client.document(vault, item, file_name).await,
            Self::LocalCli(cli) => cli.document(account, vault, item, file_name).await,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Backend").field(&self.name()).finish()
    }
}
