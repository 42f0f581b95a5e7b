//! Core types for secret references and fetched vault items

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// URI scheme accepted by [`SecretReference::from_str`]
pub const REFERENCE_SCHEME: &str = "op://";

/// Field labels that vaults report under a different name than callers use.
///
/// `(reported, canonical)`: when an item carries `reported` but not
/// `canonical`, the value is also exposed as `canonical`.
pub const FIELD_ALIASES: &[(&str, &str)] = &[("notesPlain", "notes")];

/// Identifies one named value inside a vault item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretReference {
    /// Vault account; empty means the broker's default account
    #[serde(default)]
    pub account: String,
    pub vault: String,
    pub item: String,
    pub field: String,
}

impl SecretReference {
    pub fn new(
        account: impl Into<String>,
        vault: impl Into<String>,
        item: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            vault: vault.into(),
            item: item.into(),
            field: field.into(),
        }
    }

    /// Replace the account, keeping the rest of the reference
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        for (name, value) in [("vault", &self.vault), ("item", &self.item), ("field", &self.field)] {
            if value.trim().is_empty() {
                return Err(Error::invalid_reference(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

impl FromStr for SecretReference {
    type Err = Error;

    /// Parse `op://vault/item/field`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(REFERENCE_SCHEME).ok_or_else(|| {
            Error::invalid_reference(format!("expected {}vault/item/field", REFERENCE_SCHEME))
        })?;

        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [vault, item, field] => {
                let reference = Self::new("", *vault, *item, *field);
                reference.validate()?;
                Ok(reference)
            }
            _ => Err(Error::invalid_reference(format!(
                "expected {}vault/item/field, got {} path segments",
                REFERENCE_SCHEME,
                parts.len()
            ))),
        }
    }
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.account.is_empty() {
            write!(f, "{}:", self.account)?;
        }
        write!(f, "{}{}/{}/{}", REFERENCE_SCHEME, self.vault, self.item, self.field)
    }
}

/// Identifies a file-type vault entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DocumentReference {
    /// File name inside the item; empty selects the item's only/first file
    #[serde(default)]
    pub field: String,
    pub vault: String,
    pub item: String,
    /// Vault account; empty means the broker's default account
    #[serde(default)]
    pub account: String,
}

impl DocumentReference {
    pub fn new(vault: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            vault: vault.into(),
            item: item.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// File name filter, if one was given
    pub fn file_name(&self) -> Option<&str> {
        let field = self.field.trim();
        (!field.is_empty()).then_some(field)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.vault.trim().is_empty() || self.item.trim().is_empty() {
            return Err(Error::invalid_reference("vault and item must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", REFERENCE_SCHEME, self.vault, self.item)?;
        if let Some(name) = self.file_name() {
            write!(f, "#{}", name)?;
        }
        Ok(())
    }
}

/// Normalize a raw field value: trim surrounding whitespace, then turn
/// literal `\n` sequences into real newlines (multi-line keys are often
/// stored single-line).
pub fn normalize_value(raw: &str) -> String {
    raw.trim().replace("\\n", "\n")
}

/// Label → value map of one vault item, values zeroed on drop
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: HashMap<String, String>,
}

impl FieldMap {
    /// Build from raw `(label, value)` pairs, normalizing values and applying [`FIELD_ALIASES`]
    pub fn from_raw<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut fields: HashMap<String, String> = pairs
            .into_iter()
            .map(|(label, value)| (label.into(), normalize_value(value.as_ref())))
            .collect();

        for (reported, canonical) in FIELD_ALIASES {
            if fields.contains_key(*canonical) {
                continue;
            }
            if let Some(value) = fields.get(*reported).cloned() {
                fields.insert((*canonical).to_string(), value);
            }
        }

        Self { fields }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.fields.contains_key(label)
    }

    /// Field labels, sorted
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMap")
            .field("labels", &self.labels())
            .finish_non_exhaustive()
    }
}

impl Drop for FieldMap {
    fn drop(&mut self) {
        for value in self.fields.values_mut() {
            value.zeroize();
        }
    }
}
