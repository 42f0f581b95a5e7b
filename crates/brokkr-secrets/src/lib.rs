//! Vault secret broker for Brokkr
//!
//! Reads secrets from a password vault for configuration rendering:
//! - **Backends**: a Connect server over HTTP, or the local `op` CLI
//! - **Sessions**: CLI sign-in state per account, trusted for a TTL and kept
//!   alive by a background worker
//! - **Caching**: each item is fetched at most once per broker
//! - **Templates**: `<% op("account", "vault", "item", "field") %>` actions
//!   rendered strictly into files

pub mod backends;
pub mod broker;
pub mod cache;
pub mod error;
mod files;
pub mod keepalive;
pub mod security;
pub mod session;
pub mod template;
pub mod token_file;
pub mod types;

// Re-export commonly used items
pub use backends::{Backend, ConnectClient, OpCli, WhoAmI};
pub use broker::SecretBroker;
pub use cache::{CacheStats, SecretCache};
pub use error::{Error, Result};
pub use keepalive::KeepAliveRegistry;
pub use security::{AuditLog, SecureString};
pub use session::{AuthSession, AuthState, SessionOptions, SignInOutcome};
pub use template::{RenderError, SecretLookup, Template, TemplateRenderer};
pub use types::{DocumentReference, FieldMap, SecretReference};
