//! Per-account authentication session
//!
//! Tracks whether the CLI holds a valid session for one account. A positive
//! check is trusted for the session TTL; a changed token on disk forces an
//! immediate re-check. Sessions backed by a service account token or Connect
//! credentials are always authenticated and never touch the CLI.

use crate::backends::OpCli;
use crate::error::{Error, Result};
use crate::keepalive::KeepAliveRegistry;
use crate::token_file::{read_token, session_env_var, write_token};
use brokkr_core::config::DEFAULT_SESSION_TTL_SECS;
use brokkr_core::CachedLivenessCheck;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Session behaviour knobs
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long a positive check is trusted
    pub ttl: Duration,
    /// `None` disables the keep-alive worker
    pub keepalive_interval: Option<Duration>,
    /// Token file shared with other processes
    pub token_file: Option<PathBuf>,
    /// Credentials that make interactive sign-in unnecessary are present
    pub non_interactive: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            keepalive_interval: None,
            token_file: None,
            non_interactive: false,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub account: String,
    pub signed_in: bool,
    pub signed_in_at: Option<Instant>,
}

/// What [`AuthSession::sign_in`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    /// A valid session already existed; nothing was prompted
    AlreadySignedIn,
    /// The interactive flow ran and produced a new token
    SignedIn,
}

pub struct AuthSession {
    account: String,
    cli: OpCli,
    options: SessionOptions,
    liveness: CachedLivenessCheck,
    keepalive: Arc<KeepAliveRegistry>,
    this: Weak<AuthSession>,
}

impl AuthSession {
    pub fn new(
        account: impl Into<String>,
        cli: OpCli,
        options: SessionOptions,
        keepalive: Arc<KeepAliveRegistry>,
    ) -> Arc<Self> {
        let account = account.into();
        Arc::new_cyclic(|this| Self {
            account,
            cli,
            liveness: CachedLivenessCheck::new(options.ttl),
            options,
            keepalive,
            this: this.clone(),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Environment variable the CLI reads this account's token from
    pub fn session_var(&self) -> String {
        session_env_var(&self.account)
    }

    pub async fn state(&self) -> AuthState {
        let snapshot = self.liveness.snapshot().await;
        AuthState {
            account: self.account.clone(),
            signed_in: snapshot.alive,
            signed_in_at: snapshot.checked_at.filter(|_| snapshot.alive),
        }
    }

    /// Whether a valid session exists, asking the CLI at most once per TTL
    /// window unless the persisted token changed.
    pub async fn is_authenticated(&self) -> Result<bool> {
        if self.options.non_interactive {
            return Ok(true);
        }

        let token_changed = self.reload_token_file();
        let signed_in = self
            .liveness
            .check(token_changed, || async {
                let identity = self.cli.whoami(&self.account).await?;
                Ok::<_, Error>(match identity {
                    Some(who) if who.matches(&self.account) => true,
                    Some(who) => {
                        debug!(account = %self.account, url = %who.url, "Signed in to a different account");
                        false
                    }
                    None => false,
                })
            })
            .await?;

        if signed_in {
            self.arm_keepalive();
        }
        Ok(signed_in)
    }

    /// Sign in interactively unless already authenticated.
    ///
    /// The new token is exported to this process and written to the token
    /// file when one is configured.
    pub async fn sign_in(&self) -> Result<SignInOutcome> {
        if self.is_authenticated().await? {
            debug!(account = %self.account, "Already signed in");
            return Ok(SignInOutcome::AlreadySignedIn);
        }

        let token = self.cli.sign_in(&self.account).await?;
        let var = self.session_var();
        std::env::set_var(&var, token.as_str());
        if let Some(path) = &self.options.token_file {
            write_token(path, &var, token.as_str())?;
        }

        self.liveness.mark_alive().await;
        self.arm_keepalive();
        info!(account = %self.account, "Signed in");
        Ok(SignInOutcome::SignedIn)
    }

    /// Forget the cached result; the next check asks the CLI
    pub async fn invalidate(&self) {
        self.liveness.invalidate().await;
    }

    /// Pull the token file into the environment.
    ///
    /// Returns `true` when the cached result must not be trusted: the file
    /// could not be read, or it holds a token other than the exported one.
    fn reload_token_file(&self) -> bool {
        let Some(path) = &self.options.token_file else {
            return false;
        };
        let var = self.session_var();

        match read_token(path, &var) {
            Ok(Some(token)) => {
                if std::env::var(&var).is_ok_and(|current| current == token.as_str()) {
                    return false;
                }
                debug!(account = %self.account, "Session token changed on disk");
                std::env::set_var(&var, token.as_str());
                true
            }
            Ok(None) => true,
            Err(e) => {
                debug!(account = %self.account, error = %e, "Token file not loaded");
                true
            }
        }
    }

    fn arm_keepalive(&self) {
        if let Some(interval) = self.options.keepalive_interval {
            self.keepalive.arm(&self.account, self.this.clone(), interval);
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("account", &self.account)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
