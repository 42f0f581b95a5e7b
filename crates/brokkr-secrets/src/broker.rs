//! Secret broker facade
//!
//! One broker per process. It owns the backend chosen at construction, the
//! item and document caches, one [`AuthSession`] per account and the
//! keep-alive registry. Dropping the broker stops every keep-alive worker.

use crate::backends::{Backend, OpCli};
use crate::cache::{CacheStats, SecretCache};
use crate::error::{Error, Result};
use crate::keepalive::KeepAliveRegistry;
use crate::security::{AuditLog, SecureString};
use crate::session::{AuthSession, AuthState, SessionOptions, SignInOutcome};
use crate::template::{banner, write_rendered, SecretLookup, TemplateRenderer};
use crate::types::{DocumentReference, FieldMap, SecretReference};
use async_trait::async_trait;
use brokkr_core::{BrokerConfig, CommandRunner, SystemRunner};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct SecretBroker {
    config: BrokerConfig,
    backend: Backend,
    cli: OpCli,
    items: SecretCache<Option<FieldMap>>,
    documents: SecretCache<Option<SecureString>>,
    sessions: Mutex<HashMap<String, Arc<AuthSession>>>,
    keepalive: Arc<KeepAliveRegistry>,
    renderer: TemplateRenderer,
}

impl SecretBroker {
    /// Broker using the system `op` binary and the Connect server, if configured
    pub fn new(config: BrokerConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(SystemRunner::new()))
    }

    /// Broker whose CLI calls go through `runner`
    pub fn with_runner(config: BrokerConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let backend = Backend::select(&config, Arc::clone(&runner))?;
        let cli = OpCli::new(runner, config.cli_binary.clone());
        Ok(Self::with_backend(config, backend, cli))
    }

    /// Broker with an explicitly constructed backend
    pub fn with_backend(config: BrokerConfig, backend: Backend, cli: OpCli) -> Self {
        info!(
            backend = backend.name(),
            account = %config.account,
            "Secret broker ready"
        );
        Self {
            items: SecretCache::new(config.cache_ttl),
            documents: SecretCache::new(config.cache_ttl),
            config,
            backend,
            cli,
            sessions: Mutex::new(HashMap::new()),
            keepalive: Arc::new(KeepAliveRegistry::new()),
            renderer: TemplateRenderer::new(),
        }
    }

    /// Replace the template renderer (e.g. to add base variables)
    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Session for `account` (empty means the default account), created on first use
    pub fn session(&self, account: &str) -> Arc<AuthSession> {
        let account = self.resolve_account(account).to_string();
        let mut sessions = self.lock_sessions();
        let session = sessions.entry(account).or_insert_with_key(|account| {
            debug!(account = %account, "Creating session");
            AuthSession::new(
                account.clone(),
                self.cli.clone(),
                self.session_options(),
                Arc::clone(&self.keepalive),
            )
        });
        Arc::clone(session)
    }

    /// Whether the default account has a usable session
    pub async fn is_authenticated(&self) -> Result<bool> {
        self.session("").is_authenticated().await
    }

    /// Sign the default account in unless it already is
    pub async fn sign_in(&self) -> Result<SignInOutcome> {
        self.sign_in_as("").await
    }

    pub async fn sign_in_as(&self, account: &str) -> Result<SignInOutcome> {
        self.session(account).sign_in().await
    }

    pub async fn auth_state(&self, account: &str) -> AuthState {
        self.session(account).state().await
    }

    /// Add an account to the local CLI configuration (interactive)
    pub async fn register(&self, email: &str, address: Option<&str>) -> Result<()> {
        self.cli.add_account(email, address).await?;
        info!(email, "Account registered");
        Ok(())
    }

    /// Value of one field
    pub async fn get(&self, reference: &SecretReference) -> Result<String> {
        reference.validate()?;
        let account = self.resolve_account(&reference.account).to_string();
        let audit = AuditLog::new("get", reference.to_string(), self.backend.name());

        let result = self.fetch_field(&account, reference).await;
        match &result {
            Ok(_) => audit.log(),
            Err(e) => audit.with_error(e).log(),
        }
        result
    }

    /// Raw content of a document item
    pub async fn get_document(&self, reference: &DocumentReference) -> Result<String> {
        reference.validate()?;
        let account = self.resolve_account(&reference.account).to_string();
        let audit = AuditLog::new("document", reference.to_string(), self.backend.name());

        let result = self.fetch_document(&account, reference).await;
        match &result {
            Ok(_) => audit.log(),
            Err(e) => audit.with_error(e).log(),
        }
        result
    }

    /// Render a template string
    pub async fn render(&self, source: &str) -> Result<Vec<u8>> {
        self.render_with(source, &HashMap::new(), &CancellationToken::new())
            .await
    }

    /// Render with variables; cancelling `cancel` aborts outstanding lookups
    pub async fn render_with(
        &self,
        source: &str,
        vars: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.renderer.render(source, self, vars, cancel).await
    }

    /// Render a template file
    pub async fn render_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.render_file_with(path, &HashMap::new(), &CancellationToken::new())
            .await
    }

    pub async fn render_file_with(
        &self,
        path: &Path,
        vars: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        self.render_with(&source, vars, cancel).await
    }

    /// Render `source` into `destination` with a generated-file banner.
    ///
    /// Nothing is written unless rendering succeeds.
    pub async fn render_file_to(&self, source: &Path, destination: &Path) -> Result<()> {
        self.render_file_to_with(source, destination, &HashMap::new(), &CancellationToken::new())
            .await
    }

    pub async fn render_file_to_with(
        &self,
        source: &Path,
        destination: &Path,
        vars: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let rendered = self.render_file_with(source, vars, cancel).await?;
        let banner = banner(source, destination, chrono::Utc::now());
        write_rendered(destination, banner.as_deref(), &rendered)?;
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "Rendered template"
        );
        Ok(())
    }

    /// Forget a cached item so the next lookup refetches it
    pub fn invalidate_item(&self, account: &str, vault: &str, item: &str) {
        let account = self.resolve_account(account);
        self.items.invalidate(&item_key(account, vault, item));
        self.documents
            .invalidate_prefix(&document_prefix(account, vault, item));
    }

    pub fn clear_cache(&self) {
        self.items.clear();
        self.documents.clear();
    }

    /// `(items, documents)` cache counters
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.items.stats(), self.documents.stats())
    }

    /// Number of running keep-alive workers
    pub fn keepalive_workers(&self) -> usize {
        self.keepalive.running()
    }

    /// Stop every keep-alive worker
    pub fn shutdown(&self) {
        self.keepalive.shutdown();
    }

    async fn fetch_field(&self, account: &str, reference: &SecretReference) -> Result<String> {
        self.ensure_session(account).await?;

        let key = item_key(account, &reference.vault, &reference.item);
        let fields = match self
            .items
            .get_or_load(&key, || {
                self.backend
                    .fetch_fields(account, &reference.vault, &reference.item)
            })
            .await
        {
            Ok(fields) => fields,
            Err(e) => return Err(self.on_backend_error(account, e).await),
        };

        let fields = fields
            .as_ref()
            .ok_or_else(|| Error::item_not_found(&reference.vault, &reference.item))?;
        fields
            .get(&reference.field)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::field_not_found(&reference.vault, &reference.item, &reference.field)
            })
    }

    async fn fetch_document(&self, account: &str, reference: &DocumentReference) -> Result<String> {
        self.ensure_session(account).await?;

        let key = document_key(
            account,
            &reference.vault,
            &reference.item,
            reference.file_name().unwrap_or_default(),
        );
        let document = match self
            .documents
            .get_or_load(&key, || async {
                let content = self
                    .backend
                    .fetch_document(
                        account,
                        &reference.vault,
                        &reference.item,
                        reference.file_name(),
                    )
                    .await?;
                Ok::<_, Error>(content.map(SecureString::from))
            })
            .await
        {
            Ok(document) => document,
            Err(e) => return Err(self.on_backend_error(account, e).await),
        };

        document
            .map(|content| content.as_str().to_string())
            .ok_or_else(|| Error::item_not_found(&reference.vault, &reference.item))
    }

    async fn ensure_session(&self, account: &str) -> Result<()> {
        if !self.backend.requires_session() {
            return Ok(());
        }
        if self.session(account).is_authenticated().await? {
            Ok(())
        } else {
            Err(Error::not_signed_in(account))
        }
    }

    /// A lookup that finds the session gone drops the cached "signed in"
    async fn on_backend_error(&self, account: &str, error: Error) -> Error {
        if matches!(error, Error::NotSignedIn { .. }) {
            self.session(account).invalidate().await;
        }
        error
    }

    fn resolve_account<'a>(&'a self, account: &'a str) -> &'a str {
        if account.is_empty() {
            &self.config.account
        } else {
            account
        }
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            ttl: self.config.session_ttl,
            keepalive_interval: self.config.keepalive_interval,
            token_file: self.config.token_file.clone(),
            non_interactive: self.config.credentials.is_non_interactive(),
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<AuthSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SecretLookup for SecretBroker {
    async fn lookup(&self, reference: &SecretReference) -> Result<String> {
        self.get(reference).await
    }
}

impl Drop for SecretBroker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SecretBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBroker")
            .field("backend", &self.backend)
            .field("account", &self.config.account)
            .finish_non_exhaustive()
    }
}

/// Cache key built from length-prefixed parts.
///
/// Titles may contain any separator, so each part carries its byte length;
/// no two distinct part lists share a key, and a key for N parts is a
/// prefix only of keys extending the same N parts.
fn cache_key(kind: &str, parts: &[&str]) -> String {
    let mut key = format!("{}:", kind);
    for part in parts {
        key.push_str(&format!("{}:{}/", part.len(), part));
    }
    key
}

fn item_key(account: &str, vault: &str, item: &str) -> String {
    cache_key("item", &[account, vault, item])
}

/// Shared prefix of every cached file of one document item
fn document_prefix(account: &str, vault: &str, item: &str) -> String {
    cache_key("document", &[account, vault, item])
}

fn document_key(account: &str, vault: &str, item: &str, file_name: &str) -> String {
    cache_key("document", &[account, vault, item, file_name])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_are_scoped_by_account() {
        assert_ne!(item_key("a", "v", "i"), item_key("b", "v", "i"));
        assert!(document_key("a", "v", "i", "cert.pem").starts_with(&document_prefix("a", "v", "i")));
    }

    #[test]
    fn test_cache_keys_survive_separators_in_titles() {
        assert_ne!(item_key("", "a/b", "c"), item_key("", "a", "b/c"));
        assert_ne!(item_key("x/y", "v", "i"), item_key("x", "y/v", "i"));
        assert_ne!(
            document_key("", "v", "i#a", "b"),
            document_key("", "v", "i", "a#b")
        );
        assert!(!document_key("", "v", "item-2", "f").starts_with(&document_prefix("", "v", "item")));
    }
}
