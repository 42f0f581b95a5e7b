//! Common test helpers for brokkr-secrets integration tests
//!
//! - [`FakeOp`]: a scripted stand-in for the `op` binary with a toggleable
//!   session and an in-memory vault
//! - [`CommandLog`]: records every invocation for interaction assertions
//! - Config fixtures for the CLI and Connect backends

use async_trait::async_trait;
use brokkr_core::{BrokerConfig, CommandOutput, CommandRunner, CredentialEnv};
use brokkr_secrets::{Backend, OpCli, SecretBroker};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ACCOUNT: &str = "my";
#[allow(dead_code)]
pub const SESSION_TOKEN: &str = "session-token-1";

// ─── Process Mock Infrastructure ─────────────────────────────────────────────

/// Records of CLI invocations. Each entry is the argument list.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

#[allow(dead_code)]
impl CommandLog {
    pub fn record(&self, args: &[String]) {
        self.calls.lock().unwrap().push(args.to_vec());
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose leading arguments are `prefix`
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|args| {
                args.len() >= prefix.len() && args.iter().zip(prefix).all(|(a, p)| a == p)
            })
            .count()
    }

    pub fn assert_not_called(&self, prefix: &[&str]) {
        assert_eq!(
            self.count(prefix),
            0,
            "{:?} was called. Actual calls: {:?}",
            prefix,
            self.calls()
        );
    }
}

#[derive(Debug, Default)]
struct FakeState {
    signed_in: bool,
    /// Sign-in address `whoami` reports; the default account's when unset
    whoami_url: Option<String>,
    items: HashMap<(String, String), Vec<(String, String)>>,
    documents: HashMap<(String, String), String>,
}

/// Scripted `op` binary
#[derive(Debug, Default)]
pub struct FakeOp {
    state: Mutex<FakeState>,
    pub log: CommandLog,
}

#[allow(dead_code)]
impl FakeOp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signed_in() -> Arc<Self> {
        let op = Self::new();
        op.set_signed_in(true);
        op
    }

    pub fn set_signed_in(&self, signed_in: bool) {
        self.state.lock().unwrap().signed_in = signed_in;
    }

    /// Make `whoami` report a session for another sign-in address
    pub fn set_whoami_url(&self, url: &str) {
        self.state.lock().unwrap().whoami_url = Some(url.to_string());
    }

    pub fn add_item(&self, vault: &str, item: &str, fields: &[(&str, &str)]) {
        self.state.lock().unwrap().items.insert(
            (vault.to_string(), item.to_string()),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    pub fn add_document(&self, vault: &str, item: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert((vault.to_string(), item.to_string()), content.to_string());
    }

    fn respond(&self, args: &[String]) -> CommandOutput {
        let state = self.state.lock().unwrap();
        let words: Vec<&str> = args.iter().map(String::as_str).collect();

        match words.as_slice() {
            ["whoami", ..] if state.signed_in => CommandOutput::ok(serde_json::json!({
                "url": state.whoami_url.as_deref().unwrap_or("https://my.1password.com"),
                "email": "me@example.com",
                "user_uuid": "USERUUID",
                "account_uuid": "ACCOUNTUUID",
            })
            .to_string()),
            ["whoami", ..] => CommandOutput::failed(1, "[ERROR] account is not signed in"),
            ["signin", ..] => CommandOutput::ok(format!("{}\n", SESSION_TOKEN)),
            ["account", "add", ..] => CommandOutput::ok(String::new()),
            [_, "get", ..] if !state.signed_in => {
                CommandOutput::failed(1, "[ERROR] You are not currently signed in.")
            }
            ["item", "get", item, "--vault", vault, ..] => {
                match state.items.get(&(vault.to_string(), item.to_string())) {
                    Some(fields) => {
                        let fields: Vec<_> = fields
                            .iter()
                            .map(|(label, value)| {
                                serde_json::json!({ "id": label, "label": label, "value": value })
                            })
                            .collect();
                        CommandOutput::ok(serde_json::json!({ "fields": fields }).to_string())
                    }
                    None => CommandOutput::failed(1, format!(
                        "[ERROR] \"{}\" isn't an item in the \"{}\" vault.",
                        item, vault
                    )),
                }
            }
            ["document", "get", item, "--vault", vault, ..] => {
                match state.documents.get(&(vault.to_string(), item.to_string())) {
                    Some(content) => CommandOutput::ok(content.clone()),
                    None => CommandOutput::failed(1, format!("[ERROR] \"{}\" isn't an item.", item)),
                }
            }
            _ => CommandOutput::failed(1, "[ERROR] unknown command"),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeOp {
    async fn run(&self, _program: &str, args: &[String]) -> brokkr_core::Result<CommandOutput> {
        self.log.record(args);
        Ok(self.respond(args))
    }

    async fn run_interactive(
        &self,
        _program: &str,
        args: &[String],
    ) -> brokkr_core::Result<CommandOutput> {
        self.log.record(args);
        let output = self.respond(args);
        if args.first().is_some_and(|a| a == "signin") {
            self.set_signed_in(true);
        }
        Ok(output)
    }

    fn is_available(&self, _program: &str) -> bool {
        true
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// CLI-backend configuration with no ambient credentials
pub fn cli_config() -> BrokerConfig {
    BrokerConfig::default()
        .with_account(ACCOUNT)
        .with_credentials(CredentialEnv::default())
        .with_keepalive_interval(None)
}

#[allow(dead_code)]
pub fn cli_config_with_token_file(path: PathBuf) -> BrokerConfig {
    cli_config().with_token_file(Some(path))
}

#[allow(dead_code)]
pub fn cli_config_with_keepalive(ttl: Duration, interval: Duration) -> BrokerConfig {
    let mut config = cli_config().with_keepalive_interval(Some(interval));
    config.session_ttl = ttl;
    config
}

/// Broker on the CLI backend driven by `op`
#[allow(dead_code)]
pub fn cli_broker(config: BrokerConfig, op: &Arc<FakeOp>) -> SecretBroker {
    SecretBroker::with_runner(config, Arc::clone(op) as Arc<dyn CommandRunner>)
        .expect("CLI backend is available")
}

/// Broker on the Connect backend pointed at `server_uri`
#[allow(dead_code)]
pub fn connect_broker(server_uri: &str, op: &Arc<FakeOp>) -> SecretBroker {
    let credentials = CredentialEnv::from_lookup(|name| match name {
        "OP_CONNECT_HOST" => Some(server_uri.to_string()),
        "OP_CONNECT_TOKEN" => Some("connect-token".to_string()),
        _ => None,
    });
    let config = cli_config().with_credentials(credentials);
    let runner = Arc::clone(op) as Arc<dyn CommandRunner>;
    let backend = Backend::select(&config, Arc::clone(&runner)).expect("Connect backend");
    assert_eq!(backend.name(), "connect");
    SecretBroker::with_backend(config, backend, OpCli::new(runner, "op"))
}
