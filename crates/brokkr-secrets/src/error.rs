//! Error types for brokkr-secrets
//!
//! Messages carry identifiers (account, vault, item, field) and never a
//! secret value.

use crate::template::RenderError;
use thiserror::Error;

/// Result type alias using brokkr-secrets' Error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The CLI backend needs a session and none is active
    #[error("Not signed in to vault account '{account}' (run `brokkr signin`)")]
    NotSignedIn { account: String },

    #[error("Item '{item}' not found in vault '{vault}'")]
    ItemNotFound { vault: String, item: String },

    #[error("Field '{field}' not found in item '{item}' (vault '{vault}')")]
    FieldNotFound {
        vault: String,
        item: String,
        field: String,
    },

    /// Neither Connect credentials nor the vault CLI are usable
    #[error("No secret backend available: {reason}")]
    BackendUnavailable { reason: String },

    /// The backend answered with something other than the value or "not found"
    #[error("{operation} failed for {target}: {message}")]
    Backend {
        operation: String,
        target: String,
        message: String,
    },

    #[error("Sign-in to '{account}' returned an empty session token")]
    EmptySessionToken { account: String },

    #[error("Invalid secret reference: {message}")]
    InvalidReference { message: String },

    #[error("Template error: {0}")]
    Render(#[from] RenderError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] brokkr_core::Error),
}

impl Error {
    pub fn not_signed_in(account: impl Into<String>) -> Self {
        Self::NotSignedIn {
            account: account.into(),
        }
    }

    pub fn item_not_found(vault: impl Into<String>, item: impl Into<String>) -> Self {
        Self::ItemNotFound {
            vault: vault.into(),
            item: item.into(),
        }
    }

    pub fn field_not_found(
        vault: impl Into<String>,
        item: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::FieldNotFound {
            vault: vault.into(),
            item: item.into(),
            field: field.into(),
        }
    }

    pub fn backend_unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }

    pub fn backend(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Self::InvalidReference {
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// True for the "value does not exist" kinds, as opposed to access failures
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound { .. } | Self::FieldNotFound { .. })
    }
}
