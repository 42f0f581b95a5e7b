//! Command implementations

pub mod check;
pub mod document;
pub mod get;
pub mod register;
pub mod render;
pub mod signin;
pub mod status;

use anyhow::{Context, Result};
use brokkr_core::BrokerConfig;
use brokkr_secrets::SecretBroker;
use tracing::debug;

use crate::cli::GlobalOpts;

/// Load configuration, applying the `--account` override
pub(crate) fn load_config(global: &GlobalOpts) -> Result<BrokerConfig> {
    let config = BrokerConfig::load(global.config.as_deref())
        .context("Failed to load configuration")?;
    let config = match &global.account {
        Some(account) => config.with_account(account.clone()),
        None => config,
    };
    debug!(
        config = ?config.config_path,
        account = %config.account,
        "Configuration loaded"
    );
    Ok(config)
}

/// Broker for the configured backend
pub(crate) fn open_broker(global: &GlobalOpts) -> Result<SecretBroker> {
    let config = load_config(global)?;
    SecretBroker::new(config).context("Failed to start the secret broker")
}

/// Human label for the effective account
pub(crate) fn account_label(broker: &SecretBroker) -> String {
    match broker.config().account.as_str() {
        "" => "the default account".to_string(),
        account => format!("'{}'", account),
    }
}
