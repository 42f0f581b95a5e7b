//! Configuration loading and management

mod credentials;
mod loader;

pub use credentials::{
    CredentialEnv, CONNECT_HOST_VAR, CONNECT_TOKEN_VAR, SERVICE_ACCOUNT_TOKEN_VAR,
};
pub use loader::{
    BrokerConfig, BrokerConfigFile, DEFAULT_CLI_BINARY, DEFAULT_KEEPALIVE_INTERVAL_SECS,
    DEFAULT_SESSION_TTL_SECS, MAX_INTERVAL_SECS,
};
