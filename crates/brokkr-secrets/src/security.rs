//! Security utilities for secret handling
//!
//! Provides:
//! - SecureString with zeroize
//! - Audit logging (never logs secret values)
//! - Redaction of CLI output before it lands in an error

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that is zeroed on drop and redacted in Debug/Display
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(value: String) -> Self {
        Self { inner: value }
    }

    /// Get the string value (use with caution)
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to owned String (consumes self)
    pub fn into_string(mut self) -> String {
        std::mem::take(&mut self.inner)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for SecureString {}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString([REDACTED {} bytes])", self.len())
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Audit record for one broker operation
#[derive(Debug, Clone)]
pub struct AuditLog {
    pub operation: &'static str,
    /// Reference being accessed, e.g. `op://infra/db/password`
    pub target: String,
    pub backend: &'static str,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AuditLog {
    pub fn new(operation: &'static str, target: impl Into<String>, backend: &'static str) -> Self {
        Self {
            operation,
            target: target.into(),
            backend,
            success: true,
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }

    /// Emit the record (never includes secret values)
    pub fn log(&self) {
        if self.success {
            tracing::debug!(
                operation = self.operation,
                target = %self.target,
                backend = self.backend,
                timestamp = %self.timestamp,
                "Secret operation successful"
            );
        } else {
            tracing::warn!(
                operation = self.operation,
                target = %self.target,
                backend = self.backend,
                error = ?self.error,
                timestamp = %self.timestamp,
                "Secret operation failed"
            );
        }
    }
}

static REDACTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)(token|key|password|secret)\s*[=:]\s*\S+", "$1=[REDACTED]"),
        (r"OP_SESSION_\w+=\S+", "OP_SESSION_[REDACTED]"),
        (r"[A-Za-z0-9+/_-]{40,}={0,2}", "[REDACTED_TOKEN]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Strip anything that looks like a credential from CLI or HTTP error text
pub fn sanitize_error(error: &str) -> String {
    let mut sanitized = error.trim().to_string();
    for (re, replacement) in REDACTIONS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).into_owned();
    }
    sanitized
}
