//! Liveness probes built on [`CachedLivenessCheck`]
//!
//! Provider plugins use these for tunnel connectivity and for
//! "is this CLI still logged in" checks (container registries, access proxies).

use crate::error::{Error, Result};
use crate::liveness::CachedLivenessCheck;
use crate::process::CommandRunner;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Checks that a TCP endpoint (typically a local tunnel) accepts connections
#[derive(Debug)]
pub struct TcpProbe {
    address: String,
    connect_timeout: Duration,
    liveness: CachedLivenessCheck,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>, ttl: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(3),
            liveness: CachedLivenessCheck::new(ttl),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// True when the endpoint accepted a connection within the TTL window
    pub async fn is_alive(&self) -> bool {
        let address = self.address.as_str();
        let timeout = self.connect_timeout;
        let result: std::result::Result<bool, std::convert::Infallible> = self
            .liveness
            .check(false, || async move {
                let connected = matches!(
                    tokio::time::timeout(timeout, TcpStream::connect(address)).await,
                    Ok(Ok(_))
                );
                debug!(address, connected, "TCP probe");
                Ok(connected)
            })
            .await;
        matches!(result, Ok(true))
    }

    pub async fn invalidate(&self) {
        self.liveness.invalidate().await;
    }
}

/// Checks that a command exits successfully, e.g. `docker login --get-login`
pub struct CommandProbe {
    runner: Arc<dyn CommandRunner>,
    program: String,
    args: Vec<String>,
    liveness: CachedLivenessCheck,
}

impl CommandProbe {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        args: Vec<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            args,
            liveness: CachedLivenessCheck::new(ttl),
        }
    }

    /// True when the command exited 0 within the TTL window.
    ///
    /// A command that cannot be spawned is an error, not a failed check.
    pub async fn is_alive(&self) -> Result<bool> {
        self.liveness
            .check(false, || async {
                let output = self.runner.run(&self.program, &self.args).await?;
                debug!(program = %self.program, code = ?output.code, "Command probe");
                Ok::<_, Error>(output.success())
            })
            .await
    }

    pub async fn invalidate(&self) {
        self.liveness.invalidate().await;
    }
}
