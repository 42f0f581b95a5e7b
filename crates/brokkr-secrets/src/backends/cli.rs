//! Local vault CLI backend
//!
//! Wraps the `op` binary. Lookups run with stdin closed; sign-in and account
//! registration run attached to the terminal because they prompt.

use crate::error::{Error, Result};
use crate::security::{sanitize_error, SecureString};
use crate::types::FieldMap;
use brokkr_core::{CommandOutput, CommandRunner};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// stderr fragments the CLI prints when an item or vault does not exist
const NOT_FOUND_MARKERS: &[&str] = &["isn't an item", "isn't a vault", "not found", "no item"];

/// stderr fragments the CLI prints when no usable session exists
const SIGNED_OUT_MARKERS: &[&str] = &[
    "not currently signed in",
    "session expired",
    "you are not signed in",
    "account is not signed in",
];

/// Identity reported by `op whoami`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct WhoAmI {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_uuid: String,
    #[serde(default)]
    pub account_uuid: String,
}

impl WhoAmI {
    /// Whether this identity is the requested account.
    ///
    /// `account` may be a sign-in address, its shorthand (`my` for
    /// `my.1password.com`), the account UUID or the user's email. An empty
    /// account matches any signed-in identity.
    pub fn matches(&self, account: &str) -> bool {
        let account = account.trim();
        if account.is_empty() {
            return true;
        }
        let url = self
            .url
            .trim_start_matches("https://")
            .trim_end_matches('/');

        url.eq_ignore_ascii_case(account)
            || url
                .to_ascii_lowercase()
                .starts_with(&format!("{}.", account.to_ascii_lowercase()))
            || self.account_uuid == account
            || self.user_uuid == account
            || self.email.eq_ignore_ascii_case(account)
    }
}

#[derive(Debug, Deserialize)]
struct CliItem {
    #[serde(default)]
    fields: Vec<CliField>,
}

#[derive(Debug, Deserialize)]
struct CliField {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

impl CliField {
    fn key(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Handle on the vault CLI binary
#[derive(Clone)]
pub struct OpCli {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl OpCli {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn is_available(&self) -> bool {
        self.runner.is_available(&self.binary)
    }

    /// Identity of the active session, or `None` when signed out.
    ///
    /// A non-zero exit means "no session". Failing to run the binary at all
    /// is an error.
    #[instrument(skip(self), level = "debug")]
    pub async fn whoami(&self, account: &str) -> Result<Option<WhoAmI>> {
        let mut args = cli_args(&["whoami"]);
        push_account(&mut args, account);
        args.extend(cli_args(&["--format", "json"]));

        let output = self.runner.run(&self.binary, &args).await?;
        if !output.success() {
            debug!(account, code = ?output.code, "whoami reports no session");
            return Ok(None);
        }

        let identity: WhoAmI = serde_json::from_str(output.stdout.trim()).map_err(|e| {
            Error::backend("whoami", account, format!("unexpected output: {}", e))
        })?;
        Ok(Some(identity))
    }

    /// Interactive sign-in; returns the raw session token
    pub async fn sign_in(&self, account: &str) -> Result<SecureString> {
        let mut args = cli_args(&["signin"]);
        push_account(&mut args, account);
        args.push("--raw".to_string());

        let output = self.runner.run_interactive(&self.binary, &args).await?;
        if !output.success() {
            return Err(Error::backend(
                "signin",
                account,
                format!("{} exited with {}", self.binary, exit_label(&output)),
            ));
        }

        let token = SecureString::from(output.stdout.trim());
        if token.is_empty() {
            return Err(Error::EmptySessionToken {
                account: account.to_string(),
            });
        }
        Ok(token)
    }

    /// Interactively add an account to the CLI's local configuration
    pub async fn add_account(&self, email: &str, address: Option<&str>) -> Result<()> {
        let mut args = cli_args(&["account", "add", "--email", email]);
        if let Some(address) = address.filter(|a| !a.trim().is_empty()) {
            args.extend(cli_args(&["--address", address]));
        }

        let output = self.runner.run_interactive(&self.binary, &args).await?;
        if !output.success() {
            return Err(Error::backend(
                "account add",
                email,
                format!("{} exited with {}", self.binary, exit_label(&output)),
            ));
        }
        Ok(())
    }

    /// All fields of `item`, keyed by label
    #[instrument(skip(self), level = "debug")]
    pub async fn item_fields(
        &self,
        account: &str,
        vault: &str,
        item: &str,
    ) -> Result<Option<FieldMap>> {
        let mut args = cli_args(&["item", "get", item, "--vault", vault]);
        push_account(&mut args, account);
        args.extend(cli_args(&["--format", "json"]));

        let target = format!("{}@{}", item, vault);
        let Some(output) = self.lookup("item get", account, &target, &args).await? else {
            return Ok(None);
        };

        let parsed: CliItem = serde_json::from_str(output.stdout.trim()).map_err(|e| {
            Error::backend("item get", &target, format!("unexpected output: {}", e))
        })?;

        let fields = FieldMap::from_raw(
            parsed
                .fields
                .iter()
                .filter_map(|field| field.text().map(|text| (field.key().to_string(), text))),
        );
        debug!(item, vault, fields = fields.len(), "Fetched item");
        Ok(Some(fields))
    }

    /// Raw content of a document item
    #[instrument(skip(self), level = "debug")]
    pub async fn document(
        &self,
        account: &str,
        vault: &str,
        item: &str,
        file_name: Option<&str>,
    ) -> Result<Option<String>> {
        let mut args = cli_args(&["document", "get", item, "--vault", vault]);
        push_account(&mut args, account);
        if let Some(name) = file_name {
            args.extend(cli_args(&["--file-name", name]));
        }

        let target = format!("{}@{}", item, vault);
        Ok(self
            .lookup("document get", account, &target, &args)
            .await?
            .map(|output| output.stdout))
    }

    /// Run a read command, mapping "does not exist" to `None` and
    /// "no session" to [`Error::NotSignedIn`]
    async fn lookup(
        &self,
        operation: &str,
        account: &str,
        target: &str,
        args: &[String],
    ) -> Result<Option<CommandOutput>> {
        let output = self.runner.run(&self.binary, args).await?;
        if output.success() {
            return Ok(Some(output));
        }

        let stderr = output.stderr.to_ascii_lowercase();
        if SIGNED_OUT_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Err(Error::not_signed_in(account));
        }
        if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
            debug!(operation, target, "Not found");
            return Ok(None);
        }

        let message = match sanitize_error(&output.stderr) {
            s if s.is_empty() => format!("exited with {}", exit_label(&output)),
            s => s,
        };
        Err(Error::backend(operation, target, message))
    }
}

impl std::fmt::Debug for OpCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpCli").field("binary", &self.binary).finish()
    }
}

fn cli_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn push_account(args: &mut Vec<String>, account: &str) {
    if !account.is_empty() {
        args.push("--account".to_string());
        args.push(account.to_string());
    }
}

fn exit_label(output: &CommandOutput) -> String {
    match output.code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}
